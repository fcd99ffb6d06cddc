//! History window export as long-format CSV: `entity,field,timestamp,value`.

use crate::domain::error::TickwatchError;
use crate::domain::history::HistoryRecorder;
use chrono::SecondsFormat;
use std::io::Write;

pub fn write_history<W: Write>(history: &HistoryRecorder, out: W) -> Result<(), TickwatchError> {
    let mut writer = csv::Writer::from_writer(out);
    let csv_err = |e: csv::Error| TickwatchError::Output {
        reason: format!("CSV write error: {}", e),
    };

    writer
        .write_record(["entity", "field", "timestamp", "value"])
        .map_err(csv_err)?;
    for (entity, field, points) in history.iter() {
        for point in points {
            let timestamp = point.at.to_rfc3339_opts(SecondsFormat::Millis, true);
            let value = point.value.to_string();
            writer
                .write_record([entity, field, timestamp.as_str(), value.as_str()])
                .map_err(csv_err)?;
        }
    }
    writer.flush()?;
    Ok(())
}
