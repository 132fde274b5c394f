// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory map from session handle to workspace.
//!
//! Records live for the lifetime of the owning [`WorkspaceRegistry`] and are
//! never persisted. Lock guards are never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::error::CoreError;

/// Workspace binding for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRecord {
    pub session_handle: String,
    pub workspace_path: PathBuf,
    pub branch_name: String,
    /// The session was created as a managed sub-agent; isolation is mandatory.
    pub supervised_agent: bool,
    /// A non-supervised session explicitly requested isolation.
    pub opted_in: bool,
}

#[derive(Debug, Clone)]
struct Binding {
    workspace_path: PathBuf,
    branch_name: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    bindings: HashMap<String, Binding>,
    supervised: HashSet<String>,
    opted_in: HashSet<String>,
}

/// Session → workspace registry.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    state: RwLock<RegistryState>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind a session to a workspace, replacing any previous binding.
    pub fn register(&self, session: &str, workspace_path: &Path, branch_name: &str) {
        debug!(session, path = %workspace_path.display(), "Registered workspace");
        self.write().bindings.insert(
            session.to_string(),
            Binding {
                workspace_path: workspace_path.to_path_buf(),
                branch_name: branch_name.to_string(),
            },
        );
    }

    /// Full record for a session, if it has a workspace bound.
    pub fn get(&self, session: &str) -> Option<WorkspaceRecord> {
        let state = self.read();
        let binding = state.bindings.get(session)?;
        Some(WorkspaceRecord {
            session_handle: session.to_string(),
            workspace_path: binding.workspace_path.clone(),
            branch_name: binding.branch_name.clone(),
            supervised_agent: state.supervised.contains(session),
            opted_in: state.opted_in.contains(session),
        })
    }

    pub fn workspace_path(&self, session: &str) -> Option<PathBuf> {
        self.read()
            .bindings
            .get(session)
            .map(|b| b.workspace_path.clone())
    }

    /// Flag a session as a supervised agent. The flag is permanent.
    pub fn mark_supervised(&self, session: &str) {
        self.write().supervised.insert(session.to_string());
    }

    pub fn is_supervised(&self, session: &str) -> bool {
        self.read().supervised.contains(session)
    }

    pub fn is_opted_in(&self, session: &str) -> bool {
        self.read().opted_in.contains(session)
    }

    /// Bind an unsupervised session to `workspace_path` at its own request.
    pub fn opt_in(
        &self,
        session: &str,
        workspace_path: &Path,
        branch_name: &str,
    ) -> Result<(), CoreError> {
        let mut state = self.write();
        if state.supervised.contains(session) {
            return Err(CoreError::WorkspaceLocked(session.to_string()));
        }
        state.bindings.insert(
            session.to_string(),
            Binding {
                workspace_path: workspace_path.to_path_buf(),
                branch_name: branch_name.to_string(),
            },
        );
        state.opted_in.insert(session.to_string());
        info!(session, path = %workspace_path.display(), "Session opted into workspace");
        Ok(())
    }

    /// Drop an unsupervised session's binding.
    ///
    /// Returns the record that was removed, if any.
    pub fn opt_out(&self, session: &str) -> Result<Option<WorkspaceRecord>, CoreError> {
        if self.is_supervised(session) {
            return Err(CoreError::WorkspaceLocked(session.to_string()));
        }
        let previous = self.get(session);
        let mut state = self.write();
        state.bindings.remove(session);
        state.opted_in.remove(session);
        info!(session, "Session opted out of workspace");
        Ok(previous)
    }

    /// Remove every binding pointing at `workspace_path`.
    ///
    /// Returns the sessions that were unbound.
    pub fn remove_by_path(&self, workspace_path: &Path) -> Vec<String> {
        let mut state = self.write();
        let sessions: Vec<String> = state
            .bindings
            .iter()
            .filter(|(_, b)| b.workspace_path == workspace_path)
            .map(|(s, _)| s.clone())
            .collect();
        for session in &sessions {
            state.bindings.remove(session);
            state.opted_in.remove(session);
        }
        sessions
    }

    /// All records, sorted by session handle.
    pub fn records(&self) -> Vec<WorkspaceRecord> {
        let mut sessions: Vec<String> = self.read().bindings.keys().cloned().collect();
        sessions.sort();
        sessions.iter().filter_map(|s| self.get(s)).collect()
    }

    pub fn len(&self) -> usize {
        self.read().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything, including supervised flags.
    pub fn reset(&self) {
        *self.write() = RegistryState::default();
    }
}
