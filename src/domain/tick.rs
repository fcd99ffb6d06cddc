//! Raw tick ingestion.
//!
//! Ticks arrive in batches of JSON objects. Each one is keyed by its ticker
//! (upper-cased) in the [`RawPool`]; a later tick for the same ticker replaces
//! the earlier one wholesale. Entries without a usable ticker are dropped
//! without failing the rest of the batch.

use crate::domain::value::{FieldMap, FieldValue};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RawTick {
    pub ticker: String,
    pub fields: FieldMap,
}

impl RawTick {
    /// Build a tick from a JSON object, reading the ticker from `ticker_key`.
    ///
    /// Returns `None` when the value is not an object or the ticker is
    /// missing, blank, or not a string/number. Non-scalar fields are skipped.
    pub fn from_json(value: &serde_json::Value, ticker_key: &str) -> Option<Self> {
        let object = value.as_object()?;
        let ticker = match object.get(ticker_key)? {
            serde_json::Value::String(s) => s.trim().to_uppercase(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if ticker.is_empty() {
            return None;
        }

        let fields = object
            .iter()
            .filter_map(|(key, v)| FieldValue::from_json(v).map(|fv| (key.clone(), fv)))
            .collect();

        Some(Self { ticker, fields })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    pub dropped: usize,
}

/// Latest tick per ticker. No history.
#[derive(Debug, Clone, Default)]
pub struct RawPool {
    ticks: HashMap<String, RawTick>,
}

impl RawPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch into the pool.
    pub fn ingest(&mut self, batch: &[serde_json::Value], ticker_key: &str) -> IngestStats {
        let mut stats = IngestStats::default();
        for item in batch {
            match RawTick::from_json(item, ticker_key) {
                Some(tick) => {
                    self.insert(tick);
                    stats.accepted += 1;
                }
                None => stats.dropped += 1,
            }
        }
        stats
    }

    pub fn insert(&mut self, tick: RawTick) {
        self.ticks.insert(tick.ticker.clone(), tick);
    }

    /// Look up by ticker, case-insensitively.
    pub fn get(&self, ticker: &str) -> Option<&RawTick> {
        self.ticks.get(&ticker.to_uppercase())
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}
