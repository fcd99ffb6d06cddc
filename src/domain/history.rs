//! Bounded recent-value history per (entity, field).

use crate::domain::value::Snapshot;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_MAX_POINTS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Records every numeric cell of each published snapshot.
///
/// A consumer of the snapshot only; nothing here feeds back into the engine.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    max_points: usize,
    series: BTreeMap<String, BTreeMap<String, VecDeque<HistoryPoint>>>,
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl HistoryRecorder {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            series: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, snapshot: &Snapshot, at: DateTime<Utc>) {
        for (entity, fields) in snapshot {
            for (field, value) in fields {
                let Some(value) = value.as_number() else {
                    continue;
                };
                let series = self
                    .series
                    .entry(entity.clone())
                    .or_default()
                    .entry(field.clone())
                    .or_default();
                series.push_back(HistoryPoint { at, value });
                while series.len() > self.max_points {
                    series.pop_front();
                }
            }
        }
    }

    /// Points for one series, oldest first.
    pub fn series(&self, entity: &str, field: &str) -> Option<&VecDeque<HistoryPoint>> {
        self.series.get(entity)?.get(field)
    }

    /// Every series as `(entity, field, points)`, sorted by entity then field.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &VecDeque<HistoryPoint>)> {
        self.series.iter().flat_map(|(entity, fields)| {
            fields
                .iter()
                .map(move |(field, points)| (entity.as_str(), field.as_str(), points))
        })
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
