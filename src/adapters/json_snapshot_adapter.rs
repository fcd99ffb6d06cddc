//! JSON-lines snapshot sink: one `{"cycle": n, "entities": {...}}` per cycle.

use crate::domain::error::TickwatchError;
use crate::domain::value::Snapshot;
use crate::ports::snapshot_port::SnapshotSink;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct SnapshotLine<'a> {
    cycle: usize,
    entities: &'a Snapshot,
}

pub struct JsonSnapshotAdapter<W: Write> {
    out: W,
}

impl<W: Write> JsonSnapshotAdapter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn output_error(e: impl std::fmt::Display) -> TickwatchError {
    TickwatchError::Output {
        reason: e.to_string(),
    }
}

impl<W: Write> SnapshotSink for JsonSnapshotAdapter<W> {
    fn publish(&mut self, cycle: usize, snapshot: &Snapshot) -> Result<(), TickwatchError> {
        let line = SnapshotLine {
            cycle,
            entities: snapshot,
        };
        serde_json::to_writer(&mut self.out, &line).map_err(output_error)?;
        self.out.write_all(b"\n").map_err(output_error)
    }

    fn finish(&mut self) -> Result<(), TickwatchError> {
        self.out.flush().map_err(output_error)
    }
}
