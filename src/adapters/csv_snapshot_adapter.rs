//! CSV snapshot sink.
//!
//! Keeps the latest published snapshot and writes it as a table when the
//! run finishes: one row per entity, one column per field name seen on any
//! entity. Missing and null cells are empty. Rows follow the configured
//! entity order; entities not named there come last, by name.

use crate::domain::error::TickwatchError;
use crate::domain::value::Snapshot;
use crate::ports::snapshot_port::SnapshotSink;
use std::collections::BTreeSet;
use std::io::Write;

pub struct CsvSnapshotAdapter<W: Write> {
    writer: csv::Writer<W>,
    latest: Option<(usize, Snapshot)>,
    order: Vec<String>,
}

impl<W: Write> CsvSnapshotAdapter<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
            latest: None,
            order: Vec::new(),
        }
    }

    /// Emit rows in `order` (usually the workspace display order).
    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = order;
        self
    }

    pub fn into_inner(self) -> Result<W, TickwatchError> {
        self.writer.into_inner().map_err(|e| TickwatchError::Output {
            reason: e.to_string(),
        })
    }
}

fn csv_error(e: csv::Error) -> TickwatchError {
    TickwatchError::Output {
        reason: format!("CSV write error: {}", e),
    }
}

/// Write `snapshot` as a table with a leading `cycle,entity` pair of columns.
pub fn write_table<W: Write>(
    writer: &mut csv::Writer<W>,
    cycle: usize,
    snapshot: &Snapshot,
    order: &[String],
) -> Result<(), TickwatchError> {
    let columns: BTreeSet<&str> = snapshot
        .values()
        .flat_map(|fields| fields.keys().map(String::as_str))
        .collect();

    let mut header = vec!["cycle", "entity"];
    header.extend(columns.iter().copied());
    writer.write_record(&header).map_err(csv_error)?;

    let listed = order
        .iter()
        .filter_map(|name| snapshot.get_key_value(name.as_str()));
    let rest = snapshot.iter().filter(|(name, _)| !order.contains(*name));

    let cycle = cycle.to_string();
    for (entity, fields) in listed.chain(rest) {
        let mut row = vec![cycle.clone(), entity.clone()];
        row.extend(
            columns
                .iter()
                .map(|col| fields.get(*col).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row).map_err(csv_error)?;
    }
    Ok(())
}

impl<W: Write> SnapshotSink for CsvSnapshotAdapter<W> {
    fn publish(&mut self, cycle: usize, snapshot: &Snapshot) -> Result<(), TickwatchError> {
        self.latest = Some((cycle, snapshot.clone()));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TickwatchError> {
        if let Some((cycle, snapshot)) = self.latest.take() {
            write_table(&mut self.writer, cycle, &snapshot, &self.order)?;
        }
        self.writer.flush().map_err(TickwatchError::from)
    }
}
