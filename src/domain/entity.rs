//! Workspace entities.
//!
//! Definitions arrive as loosely typed records (`entity_type` plus a JSON
//! `definition` payload). They are converted once, at load time, into the
//! typed [`EntityKind`] variants the engine works with:
//! - `BaseStock`: a native instrument referenced by market code
//! - `StockGroup`: a weighted basket of base stocks
//! - `CustomField`: a formula evaluated for every entity
//! - `AlertRule`: a boolean formula plus actions and a trigger policy

use crate::domain::error::TickwatchError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    BaseStock,
    StockGroup,
    CustomField,
    AlertRule,
}

/// Entity as supplied by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityRecord {
    pub id: i64,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub definition: serde_json::Value,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BaseStock {
    pub code: String,
}

impl BaseStock {
    /// Ticker portion of the market code: everything after the last
    /// separator, upper-cased. `None` for a blank code.
    pub fn ticker(&self, separator: char) -> Option<String> {
        let code = self.code.trim();
        if code.is_empty() {
            return None;
        }
        let ticker = code.rsplit(separator).next().unwrap_or(code).trim();
        if ticker.is_empty() {
            None
        } else {
            Some(ticker.to_uppercase())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StockGroup {
    pub members: Vec<String>,
    pub weights: HashMap<String, f64>,
}

impl StockGroup {
    pub const DEFAULT_WEIGHT: f64 = 1.0;

    pub fn weight(&self, member: &str) -> f64 {
        self.weights
            .get(member)
            .copied()
            .unwrap_or(Self::DEFAULT_WEIGHT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CustomField {
    pub formula: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Notify,
    Sound,
}

impl ActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "notification" | "notify" => Some(ActionKind::Notify),
            "sound" => Some(ActionKind::Sound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    Once,
    #[default]
    Repeating,
}

impl Frequency {
    /// Only `once` suppresses; every other value repeats.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("once") {
            Frequency::Once
        } else {
            Frequency::Repeating
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub condition: String,
    pub actions: Vec<ActionKind>,
    pub frequency: Frequency,
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AlertRuleDefinition {
    condition: String,
    actions: Vec<String>,
    frequency: String,
    is_active: bool,
}

impl From<AlertRuleDefinition> for AlertRule {
    fn from(def: AlertRuleDefinition) -> Self {
        let mut actions = Vec::new();
        for raw in &def.actions {
            match ActionKind::parse(raw) {
                Some(action) if !actions.contains(&action) => actions.push(action),
                Some(_) => {}
                None => log::warn!("ignoring unknown alert action '{raw}'"),
            }
        }
        Self {
            condition: def.condition,
            actions,
            frequency: Frequency::parse(&def.frequency),
            is_active: def.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    BaseStock(BaseStock),
    StockGroup(StockGroup),
    CustomField(CustomField),
    AlertRule(AlertRule),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub display_order: i64,
    pub kind: EntityKind,
}

impl Entity {
    pub fn base_stock(id: i64, name: &str, code: &str) -> Self {
        Self::new(
            id,
            name,
            EntityKind::BaseStock(BaseStock {
                code: code.to_string(),
            }),
        )
    }

    pub fn stock_group(id: i64, name: &str, members: &[(&str, f64)]) -> Self {
        Self::new(
            id,
            name,
            EntityKind::StockGroup(StockGroup {
                members: members.iter().map(|(m, _)| m.to_string()).collect(),
                weights: members.iter().map(|(m, w)| (m.to_string(), *w)).collect(),
            }),
        )
    }

    pub fn custom_field(id: i64, name: &str, formula: &str) -> Self {
        Self::new(
            id,
            name,
            EntityKind::CustomField(CustomField {
                formula: formula.to_string(),
            }),
        )
    }

    pub fn alert_rule(id: i64, name: &str, rule: AlertRule) -> Self {
        Self::new(id, name, EntityKind::AlertRule(rule))
    }

    fn new(id: i64, name: &str, kind: EntityKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            display_order: id,
            kind,
        }
    }
}

impl TryFrom<EntityRecord> for Entity {
    type Error = TickwatchError;

    fn try_from(record: EntityRecord) -> Result<Self, Self::Error> {
        if record.name.trim().is_empty() {
            return Err(TickwatchError::EntityInvalid {
                name: format!("#{}", record.id),
                reason: "name must not be empty".to_string(),
            });
        }

        let definition = match record.definition {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        let invalid = |e: serde_json::Error| TickwatchError::EntityInvalid {
            name: record.name.clone(),
            reason: e.to_string(),
        };

        let kind = match record.entity_type {
            EntityType::BaseStock => {
                EntityKind::BaseStock(serde_json::from_value(definition).map_err(invalid)?)
            }
            EntityType::StockGroup => {
                EntityKind::StockGroup(serde_json::from_value(definition).map_err(invalid)?)
            }
            EntityType::CustomField => {
                EntityKind::CustomField(serde_json::from_value(definition).map_err(invalid)?)
            }
            EntityType::AlertRule => {
                let def: AlertRuleDefinition =
                    serde_json::from_value(definition).map_err(invalid)?;
                EntityKind::AlertRule(def.into())
            }
        };

        Ok(Self {
            id: record.id,
            name: record.name,
            display_order: record.display_order,
            kind,
        })
    }
}

/// Upper-cased entity name → canonical name.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    by_upper: HashMap<String, String>,
}

impl NameIndex {
    pub fn build<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            by_upper: names
                .into_iter()
                .map(|name| (name.to_uppercase(), name.to_string()))
                .collect(),
        }
    }

    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.by_upper.get(&name.to_uppercase()).map(String::as_str)
    }
}

/// Workspace as supplied by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
}

/// A named collection of entities with unique (case-insensitive) names.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    entities: Vec<Entity>,
}

impl Workspace {
    pub fn new(id: i64, name: &str, entities: Vec<Entity>) -> Result<Self, TickwatchError> {
        let mut seen = HashSet::new();
        for entity in &entities {
            if !seen.insert(entity.name.to_uppercase()) {
                return Err(TickwatchError::DuplicateEntityName {
                    name: entity.name.clone(),
                });
            }
        }
        Ok(Self {
            id,
            name: name.to_string(),
            is_active: false,
            entities,
        })
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Entity names sorted by `display_order`, ties by id.
    pub fn display_order(&self) -> Vec<String> {
        let mut ordered: Vec<&Entity> = self.entities.iter().collect();
        ordered.sort_by_key(|e| (e.display_order, e.id));
        ordered.into_iter().map(|e| e.name.clone()).collect()
    }

    pub fn name_index(&self) -> NameIndex {
        NameIndex::build(self.entities.iter().map(|e| e.name.as_str()))
    }

    pub fn base_stocks(&self) -> impl Iterator<Item = (&Entity, &BaseStock)> {
        self.entities.iter().filter_map(|e| match &e.kind {
            EntityKind::BaseStock(def) => Some((e, def)),
            _ => None,
        })
    }

    pub fn stock_groups(&self) -> impl Iterator<Item = (&Entity, &StockGroup)> {
        self.entities.iter().filter_map(|e| match &e.kind {
            EntityKind::StockGroup(def) => Some((e, def)),
            _ => None,
        })
    }

    pub fn custom_fields(&self) -> impl Iterator<Item = (&Entity, &CustomField)> {
        self.entities.iter().filter_map(|e| match &e.kind {
            EntityKind::CustomField(def) => Some((e, def)),
            _ => None,
        })
    }

    pub fn alert_rules(&self) -> impl Iterator<Item = (&Entity, &AlertRule)> {
        self.entities.iter().filter_map(|e| match &e.kind {
            EntityKind::AlertRule(def) => Some((e, def)),
            _ => None,
        })
    }

    /// The base stock whose definition carries exactly this market code.
    pub fn base_stock_by_code(&self, code: &str) -> Option<&Entity> {
        self.base_stocks()
            .find(|(_, def)| def.code == code)
            .map(|(e, _)| e)
    }
}

impl TryFrom<WorkspaceRecord> for Workspace {
    type Error = TickwatchError;

    fn try_from(record: WorkspaceRecord) -> Result<Self, Self::Error> {
        let entities = record
            .entities
            .into_iter()
            .map(Entity::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut workspace = Workspace::new(record.id, &record.name, entities)?;
        workspace.is_active = record.is_active;
        Ok(workspace)
    }
}
