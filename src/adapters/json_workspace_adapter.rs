//! JSON file workspace source.
//!
//! Accepts either a single workspace object or an array of them, in the
//! shape the backend serves: `{id, name, is_active, entities: [...]}`.

use crate::domain::entity::{Workspace, WorkspaceRecord};
use crate::domain::error::TickwatchError;
use crate::ports::workspace_port::WorkspaceSource;
use std::fs;
use std::path::PathBuf;

pub struct JsonWorkspaceAdapter {
    path: PathBuf,
}

impl JsonWorkspaceAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn source_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parse workspace JSON text.
///
/// The leading `[` picks the array form, so field errors keep their
/// line and column.
pub fn parse_workspaces(content: &str, source_name: &str) -> Result<Vec<Workspace>, TickwatchError> {
    let load_error = |e: serde_json::Error| TickwatchError::WorkspaceLoad {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    };
    let records: Vec<WorkspaceRecord> = if content.trim_start().starts_with('[') {
        serde_json::from_str(content).map_err(load_error)?
    } else {
        vec![serde_json::from_str(content).map_err(load_error)?]
    };
    records.into_iter().map(Workspace::try_from).collect()
}

impl WorkspaceSource for JsonWorkspaceAdapter {
    fn list_workspaces(&self) -> Result<Vec<Workspace>, TickwatchError> {
        let content = fs::read_to_string(&self.path).map_err(|e| TickwatchError::WorkspaceLoad {
            source_name: self.source_name(),
            reason: e.to_string(),
        })?;
        let workspaces = parse_workspaces(&content, &self.source_name())?;
        log::debug!(
            "loaded {} workspace(s) from {}",
            workspaces.len(),
            self.source_name()
        );
        Ok(workspaces)
    }
}
