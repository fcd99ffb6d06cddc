//! Snapshot publication port trait.

use crate::domain::error::TickwatchError;
use crate::domain::value::Snapshot;

/// Receives the snapshot published at the end of each cycle.
pub trait SnapshotSink {
    fn publish(&mut self, cycle: usize, snapshot: &Snapshot) -> Result<(), TickwatchError>;

    /// Flush buffered output. Called once after the last cycle.
    fn finish(&mut self) -> Result<(), TickwatchError> {
        Ok(())
    }
}
