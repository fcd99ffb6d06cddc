#![allow(dead_code)]

use serde_json::{json, Value};
use tickwatch::domain::engine::{EngineConfig, EngineState};
use tickwatch::domain::entity::{ActionKind, AlertRule, Entity, Frequency, Workspace};
use tickwatch::domain::error::TickwatchError;
use tickwatch::domain::value::{FieldValue, Snapshot};
use tickwatch::ports::alert_port::AlertSink;
use tickwatch::ports::snapshot_port::SnapshotSink;

/// Records every alert action in order.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    pub notifications: Vec<(String, String)>,
    pub sounds: usize,
}

impl AlertSink for RecordingAlertSink {
    fn notify(&mut self, title: &str, body: &str) {
        self.notifications.push((title.to_string(), body.to_string()));
    }

    fn sound(&mut self) {
        self.sounds += 1;
    }
}

/// Keeps every published snapshot.
#[derive(Debug, Default)]
pub struct MemorySnapshotSink {
    pub published: Vec<(usize, Snapshot)>,
    pub finished: bool,
}

impl SnapshotSink for MemorySnapshotSink {
    fn publish(&mut self, cycle: usize, snapshot: &Snapshot) -> Result<(), TickwatchError> {
        self.published.push((cycle, snapshot.clone()));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TickwatchError> {
        self.finished = true;
        Ok(())
    }
}

pub fn tick(ticker: &str, price: f64) -> Value {
    json!({"a1": ticker, "a2": format!("{ticker} Corp"), "a3": price})
}

pub fn workspace(entities: Vec<Entity>) -> Workspace {
    Workspace::new(1, "test", entities).unwrap()
}

pub fn engine(entities: Vec<Entity>) -> EngineState {
    EngineState::with_workspace(EngineConfig::default(), workspace(entities))
}

pub fn alert(condition: &str, frequency: Frequency) -> AlertRule {
    AlertRule {
        condition: condition.to_string(),
        actions: vec![ActionKind::Notify, ActionKind::Sound],
        frequency,
        is_active: true,
    }
}

pub fn number(snapshot: &Snapshot, entity: &str, field: &str) -> Option<f64> {
    snapshot.get(entity)?.get(field).and_then(FieldValue::as_number)
}

pub const WORKSPACE_JSON: &str = r#"[
  {
    "id": 1,
    "name": "archive",
    "is_active": false,
    "entities": []
  },
  {
    "id": 2,
    "name": "banks",
    "is_active": true,
    "entities": [
      {"id": 1, "entity_type": "BASE_STOCK", "name": "Alpha", "definition": {"code": "sh.AAA"}, "display_order": 1},
      {"id": 2, "entity_type": "BASE_STOCK", "name": "Beta", "definition": {"code": "sz.BBB"}, "display_order": 2},
      {"id": 3, "entity_type": "STOCK_GROUP", "name": "Basket",
       "definition": {"members": ["sh.AAA", "sz.BBB"], "weights": {"sh.AAA": 1, "sz.BBB": 3}}, "display_order": 3},
      {"id": 4, "entity_type": "CUSTOM_FIELD", "name": "premium",
       "definition": {"formula": "[price] / {basket}[price] - 1"}, "display_order": 4},
      {"id": 5, "entity_type": "ALERT_RULE", "name": "Basket above 15",
       "definition": {"condition": "{Basket}[price] > 15", "actions": ["notification", "sound", "sound"], "frequency": "once", "is_active": true},
       "display_order": 5}
    ]
  }
]"#;
