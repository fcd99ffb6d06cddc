//! Alert rule evaluation.
//!
//! After each cycle every active rule's condition is evaluated against the
//! published snapshot. Conditions have no current entity, so only
//! `{entity}[field]` references resolve. A condition that cannot be resolved
//! or evaluated counts as not triggered. `Once` rules are remembered in a
//! [`TriggeredSet`] and stay silent until it is cleared.

use crate::domain::entity::{ActionKind, Frequency, NameIndex, Workspace};
use crate::domain::expr_eval::{truthy, CompiledFormula};
use crate::domain::value::{FieldMap, Snapshot};
use crate::ports::alert_port::AlertSink;
use std::collections::HashSet;

/// Ids of `Once` rules that have already fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggeredSet {
    ids: HashSet<i64>,
}

impl TriggeredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, rule_id: i64) -> bool {
        self.ids.contains(&rule_id)
    }

    pub fn insert(&mut self, rule_id: i64) {
        self.ids.insert(rule_id);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub rule_id: i64,
    pub rule_name: String,
}

/// Whether `condition` holds against `snapshot`.
pub fn condition_holds(condition: &str, snapshot: &Snapshot, index: &NameIndex) -> bool {
    let compiled = CompiledFormula::compile(condition);
    match compiled.evaluate(&FieldMap::new(), snapshot, index) {
        Some(Ok(value)) => truthy(value),
        Some(Err(e)) => {
            log::debug!("alert condition '{}' faulted: {}", condition, e);
            false
        }
        None => false,
    }
}

/// Evaluate every active rule and run the actions of those that fire.
pub fn check_alerts(
    workspace: &Workspace,
    snapshot: &Snapshot,
    index: &NameIndex,
    triggered: &mut TriggeredSet,
    sink: &mut dyn AlertSink,
) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    for (entity, rule) in workspace.alert_rules() {
        if !rule.is_active || triggered.contains(entity.id) {
            continue;
        }
        if rule.condition.trim().is_empty() {
            continue;
        }
        if !condition_holds(&rule.condition, snapshot, index) {
            continue;
        }

        log::info!("alert triggered: {}", entity.name);
        for action in &rule.actions {
            match action {
                ActionKind::Notify => sink.notify(&entity.name, &rule.condition),
                ActionKind::Sound => sink.sound(),
            }
        }
        if rule.frequency == Frequency::Once {
            triggered.insert(entity.id);
        }
        events.push(AlertEvent {
            rule_id: entity.id,
            rule_name: entity.name.clone(),
        });
    }

    events
}
