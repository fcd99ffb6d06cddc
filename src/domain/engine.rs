//! Engine state and the computation cycle.
//!
//! [`EngineState`] owns everything the derivation depends on: the raw pool,
//! the active workspace and the set of fired `Once` alerts. Each mutation
//! runs one full cycle in a fixed order (aggregation, solver, publish,
//! alerts) and replaces the published snapshot wholesale.

use crate::domain::aggregation::{aggregate, AggregationContext};
use crate::domain::alert::{check_alerts, AlertEvent, TriggeredSet};
use crate::domain::entity::Workspace;
use crate::domain::fields::{FieldTable, PRIMARY_TICKER_KEY};
use crate::domain::solver::{solve, SolveReport};
use crate::domain::tick::{IngestStats, RawPool};
use crate::domain::value::Snapshot;
use crate::ports::alert_port::AlertSink;

pub const DEFAULT_MARKET_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub ticker_key: String,
    pub market_separator: char,
    pub fields: FieldTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ticker_key: PRIMARY_TICKER_KEY.to_string(),
            market_separator: DEFAULT_MARKET_SEPARATOR,
            fields: FieldTable::default(),
        }
    }
}

/// Outcome of one cycle, for logging and callers that count triggers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub ingest: IngestStats,
    pub entities: usize,
    pub solve: SolveReport,
    pub alerts: Vec<AlertEvent>,
}

/// Build the snapshot for one workspace from the current pool.
///
/// Pure: the same pool and workspace always give the same snapshot.
pub fn compute(workspace: &Workspace, pool: &RawPool, config: &EngineConfig) -> (Snapshot, SolveReport) {
    let ctx = AggregationContext {
        fields: &config.fields,
        ticker_key: &config.ticker_key,
        market_separator: config.market_separator,
    };
    let mut snapshot = aggregate(workspace, pool, &ctx);
    let report = solve(&mut snapshot, workspace, &workspace.name_index());
    (snapshot, report)
}

#[derive(Debug, Clone, Default)]
pub struct EngineState {
    config: EngineConfig,
    raw_pool: RawPool,
    workspace: Option<Workspace>,
    triggered: TriggeredSet,
    snapshot: Snapshot,
}

impl EngineState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_workspace(config: EngineConfig, workspace: Workspace) -> Self {
        Self {
            workspace: Some(workspace),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn raw_pool(&self) -> &RawPool {
        &self.raw_pool
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn triggered(&self) -> &TriggeredSet {
        &self.triggered
    }

    /// Merge a batch of ticks and run one cycle.
    pub fn ingest(&mut self, batch: &[serde_json::Value], alerts: &mut dyn AlertSink) -> CycleReport {
        let stats = self.raw_pool.ingest(batch, &self.config.ticker_key);
        if stats.dropped > 0 {
            log::debug!("dropped {} tick(s) without a usable ticker", stats.dropped);
        }
        let mut report = self.recompute(alerts);
        report.ingest = stats;
        report
    }

    /// Run one cycle on the current pool.
    pub fn recompute(&mut self, alerts: &mut dyn AlertSink) -> CycleReport {
        let Some(workspace) = &self.workspace else {
            self.snapshot = Snapshot::new();
            return CycleReport::default();
        };

        let (snapshot, solve) = compute(workspace, &self.raw_pool, &self.config);
        self.snapshot = snapshot;

        let index = workspace.name_index();
        let events = check_alerts(workspace, &self.snapshot, &index, &mut self.triggered, alerts);

        CycleReport {
            ingest: IngestStats::default(),
            entities: self.snapshot.len(),
            solve,
            alerts: events,
        }
    }

    /// Drop the raw pool and the published snapshot together.
    pub fn clear(&mut self) {
        self.raw_pool.clear();
        self.snapshot.clear();
    }

    pub fn reset_triggered(&mut self) {
        self.triggered.clear();
    }

    /// Replace the active workspace. Fired alerts are forgotten; the
    /// snapshot is left as is until the next cycle.
    pub fn switch_workspace(&mut self, workspace: Option<Workspace>) {
        self.workspace = workspace;
        self.triggered.clear();
    }
}
