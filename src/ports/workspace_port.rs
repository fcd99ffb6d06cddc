//! Workspace source port trait.

use crate::domain::entity::Workspace;
use crate::domain::error::TickwatchError;

pub trait WorkspaceSource {
    /// Every workspace the source knows about, in source order.
    fn list_workspaces(&self) -> Result<Vec<Workspace>, TickwatchError>;

    /// The workspace with `id`, or else the first marked active, or else the
    /// first one listed.
    fn active_workspace(&self, id: Option<i64>) -> Result<Workspace, TickwatchError> {
        let mut workspaces = self.list_workspaces()?;
        if let Some(id) = id {
            return workspaces
                .into_iter()
                .find(|ws| ws.id == id)
                .ok_or(TickwatchError::WorkspaceNotFound { id });
        }
        if workspaces.is_empty() {
            return Err(TickwatchError::NoWorkspace);
        }
        let pos = workspaces.iter().position(|ws| ws.is_active).unwrap_or(0);
        Ok(workspaces.swap_remove(pos))
    }
}
