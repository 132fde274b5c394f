// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Materializes per-session workspaces and routes tool calls into them.
//!
//! # Directory Structure
//!
//! ```text
//! /project/                          # Outer repository (branch never changes)
//! ├── .git/
//! ├── .agent/
//! │   └── wt/
//! │       ├── .gitignore             # "*" - keeps workspaces out of the outer repo
//! │       ├── ada-1f2e3d4c/          # Worktree on opencode/ada-1f2e3d4c
//! │       └── wren-0badc0de/         # Worktree on opencode/wren-0badc0de
//! └── src/
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::git::{Git, WorktreeEntry};
use super::registry::WorkspaceRegistry;
use crate::config::ResolvedConfig;
use crate::error::GitError;
use crate::identity::{AgentIdentity, IdentityResolver, IsolationPolicy};

/// Contents of the ignore file at the workspaces root.
const IGNORE_ALL: &str = "*\n";

/// Everything a mutation needs to know about the caller's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkspace {
    pub workspace_path: PathBuf,
    /// Target path relative to `workspace_path`.
    pub relative_path: String,
    pub branch_name: String,
    pub user_name: String,
    pub user_email: String,
}

/// Creates branches and worktrees for sessions and keeps the registry current.
pub struct WorkspaceManager {
    git: Git,
    identities: IdentityResolver,
    registry: Arc<WorkspaceRegistry>,
    workspaces_root: PathBuf,
    shell_tools: Vec<String>,
}

impl WorkspaceManager {
    pub fn new(
        repo_root: impl AsRef<Path>,
        config: &ResolvedConfig,
        registry: Arc<WorkspaceRegistry>,
    ) -> Self {
        let repo_root = repo_root.as_ref();
        Self {
            git: Git::new(repo_root),
            identities: IdentityResolver::from_config(config),
            registry,
            workspaces_root: repo_root.join(&config.agent_dir).join(&config.worktree_dir),
            shell_tools: config
                .shell_tools
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn identities(&self) -> &IdentityResolver {
        &self.identities
    }

    pub fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    pub fn repo_root(&self) -> &Path {
        self.git.repo_root()
    }

    pub fn workspaces_root(&self) -> &Path {
        &self.workspaces_root
    }

    /// Path a workspace with this name lives at.
    pub fn workspace_path_for(&self, workspace_name: &str) -> PathBuf {
        self.workspaces_root.join(workspace_name)
    }

    /// Resolve (and create if needed) the workspace for a session.
    ///
    /// Idempotent: repeated calls for the same seed return the same workspace
    /// without creating duplicate branches or worktrees.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, requested), fields(path = %requested.display())))]
    pub async fn resolve(
        &self,
        session: &str,
        seed: &str,
        known_name: Option<&str>,
        requested: &Path,
    ) -> Result<ResolvedWorkspace, GitError> {
        let identity = self
            .identities
            .derive(seed, known_name, IsolationPolicy::Worktree);
        let workspace_path = self.materialize(&identity).await?;
        self.registry
            .register(session, &workspace_path, &identity.branch_name);

        let relative_path = normalize_target(&workspace_path, self.repo_root(), requested);
        debug!(session, rel = %relative_path, "Resolved workspace");

        Ok(ResolvedWorkspace {
            workspace_path,
            relative_path,
            branch_name: identity.branch_name,
            user_name: identity.user_name,
            user_email: identity.user_email,
        })
    }

    /// Ensure the branch and worktree for `identity` exist.
    ///
    /// Does not touch the registry. Returns the absolute workspace path.
    pub async fn materialize(&self, identity: &AgentIdentity) -> Result<PathBuf, GitError> {
        let workspace_path = self.workspace_path_for(&identity.workspace_name());

        self.ensure_root().await?;
        self.git.ensure_branch(&identity.branch_name).await?;
        if self
            .git
            .add_worktree(&workspace_path, &identity.branch_name)
            .await?
        {
            info!(
                branch = %identity.branch_name,
                path = %workspace_path.display(),
                "Created workspace"
            );
        }

        Ok(workspace_path)
    }

    /// Create the workspaces root and its ignore file once.
    async fn ensure_root(&self) -> Result<(), GitError> {
        fs::create_dir_all(&self.workspaces_root).await?;

        let ignore = self.workspaces_root.join(".gitignore");
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&ignore)
            .await
        {
            Ok(mut file) => {
                file.write_all(IGNORE_ALL.as_bytes()).await?;
                debug!(path = %ignore.display(), "Wrote workspaces ignore file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => warn!(path = %ignore.display(), "Could not write ignore file: {}", e),
        }
        Ok(())
    }

    /// Redirect a tool call into the session's workspace.
    ///
    /// Sets `args.cwd` and, for shell tools, prefixes `args.command` with a
    /// `cd` into the workspace. Does nothing for sessions without a
    /// workspace. Applying it twice leaves the command unchanged.
    pub fn route(&self, session: &str, tool: &str, args: &mut Value, root_directory: &Path) {
        let Some(workspace) = self.registry.workspace_path(session) else {
            return;
        };
        let cwd = if workspace.is_absolute() {
            workspace
        } else {
            root_directory.join(workspace)
        };
        let Some(map) = args.as_object_mut() else {
            return;
        };

        let cwd_str = cwd.to_string_lossy().to_string();
        map.insert("cwd".to_string(), Value::String(cwd_str.clone()));

        if !self.shell_tools.iter().any(|t| *t == tool.to_lowercase()) {
            return;
        }
        if let Some(Value::String(command)) = map.get_mut("command") {
            if command.trim().is_empty() {
                return;
            }
            let prefix = format!("cd {} && ", shell_quote(&cwd_str));
            if !command.starts_with(&prefix) {
                *command = format!("{}({})", prefix, command);
            }
        }
    }

    /// Worktrees that live under the workspaces root.
    pub async fn list(&self) -> Result<Vec<WorktreeEntry>, GitError> {
        let root = lexical_normalize(&self.workspaces_root);
        Ok(self
            .git
            .list_worktrees()
            .await?
            .into_iter()
            .filter(|w| w.path.starts_with(&root) || w.path.starts_with(&self.workspaces_root))
            .collect())
    }

    /// Remove a workspace and unbind every session routed into it.
    pub async fn remove(&self, workspace_path: &Path) -> Result<Vec<String>, GitError> {
        self.git.remove_worktree(workspace_path).await?;
        Ok(self.registry.remove_by_path(workspace_path))
    }
}

/// Express `requested` relative to the workspace.
///
/// Paths under the workspace are taken relative to it; paths under the outer
/// repository are taken relative to that; anything else collapses to its file
/// name so unrelated absolute paths never leak into a workspace.
pub fn normalize_target(workspace: &Path, outer_root: &Path, requested: &Path) -> String {
    let absolute = if requested.is_absolute() {
        lexical_normalize(requested)
    } else {
        lexical_normalize(&outer_root.join(requested))
    };
    let base_name = || {
        absolute
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    };

    for root in [workspace, outer_root] {
        if let Ok(rel) = absolute.strip_prefix(lexical_normalize(root)) {
            let rel = rel.to_string_lossy().to_string();
            return if rel.is_empty() { base_name() } else { rel };
        }
    }
    base_name()
}

/// Quote `value` for a POSIX shell, leaving plain paths untouched.
fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_.:/%+=,@".contains(ch))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\"'\"'"))
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
