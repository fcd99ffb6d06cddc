//! Canonical field names for raw quote keys.
//!
//! Feeds deliver terse keys (`a1`, `a3`, ...). Native instruments expose them
//! under display names so formulas can say `[price]` instead of `[a3]`.
//! Keys missing from the table pass through unchanged.
//!
//! Stock groups carry their name under the display names of [`NAME_KEY`]
//! and of the configured ticker key, so a `[fields]` override of `a1` or
//! `a2` renames the group identity fields too.

use crate::domain::value::FieldMap;
use std::collections::HashMap;

/// Raw key carrying the ticker symbol in every tick.
pub const PRIMARY_TICKER_KEY: &str = "a1";

/// Raw key carrying the instrument's display name.
pub const NAME_KEY: &str = "a2";

pub const DEFAULT_FIELD_NAMES: &[(&str, &str)] = &[
    ("a1", "code"),
    ("a2", "name"),
    ("a3", "price"),
    ("a4", "change_pct"),
    ("a5", "change"),
    ("a6", "volume"),
    ("a7", "turnover"),
    ("a8", "open"),
    ("a9", "high"),
    ("a10", "low"),
    ("a11", "prev_close"),
    ("a12", "amplitude_pct"),
    ("a13", "turnover_rate_pct"),
    ("a14", "volume_ratio"),
    ("a15", "pe_ratio"),
    ("a16", "pb_ratio"),
    ("a17", "market_cap"),
    ("a18", "float_market_cap"),
    ("a19", "main_net_inflow"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct FieldTable {
    names: HashMap<String, String>,
}

impl Default for FieldTable {
    fn default() -> Self {
        Self {
            names: DEFAULT_FIELD_NAMES
                .iter()
                .map(|(raw, display)| (raw.to_string(), display.to_string()))
                .collect(),
        }
    }
}

impl FieldTable {
    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    /// Add or replace a mapping.
    pub fn insert(&mut self, raw_key: &str, display_name: &str) {
        self.names
            .insert(raw_key.to_string(), display_name.to_string());
    }

    pub fn display_name<'a>(&'a self, raw_key: &'a str) -> &'a str {
        self.names.get(raw_key).map(String::as_str).unwrap_or(raw_key)
    }

    /// Copy a raw field map, renaming every key through the table.
    pub fn rename(&self, raw: &FieldMap) -> FieldMap {
        raw.iter()
            .map(|(key, value)| (self.display_name(key).to_string(), value.clone()))
            .collect()
    }

    /// All mappings sorted by raw key, numeric suffixes in numeric order.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .names
            .iter()
            .map(|(raw, display)| (raw.as_str(), display.as_str()))
            .collect();
        entries.sort_by_key(|(raw, _)| sort_key(raw));
        entries
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn sort_key(raw: &str) -> (String, u64, String) {
    let split = raw
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (prefix, digits) = raw.split_at(split);
    match digits.parse::<u64>() {
        Ok(n) => (prefix.to_string(), n, String::new()),
        Err(_) => (prefix.to_string(), u64::MAX, digits.to_string()),
    }
}
