// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File mutation with a scoped, attributed commit per change.
//!
//! A single request runs strictly in order: read, compute, write, diff,
//! commit. Only the touched path is ever staged.

use std::path::Path;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::diff::{compute_diff, normalize_indent};
use super::edit::{apply_edit, EditOperation};
use super::message::style_commit_message;
use crate::error::{CoreError, GitError, MutationError};
use crate::telemetry::GLOBAL_METRICS;
use crate::workspace::{CommitAuthor, Git, ResolvedWorkspace};

/// Result of a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub relative_path: String,
    pub unified_diff: String,
    /// Description as given (before message styling).
    pub description: String,
    /// False when the file content did not change and nothing was committed.
    pub committed: bool,
}

/// Outcome of [`MutationEngine::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Staged diff of the path, read before committing.
    pub diff: String,
    pub committed: bool,
}

/// Applies edits and writes inside a workspace and commits them.
#[derive(Debug, Clone)]
pub struct MutationEngine {
    git: Git,
}

impl MutationEngine {
    pub fn new(git: Git) -> Self {
        Self { git }
    }

    /// Read the file and return its content with `op` applied.
    ///
    /// Nothing is written.
    pub async fn apply_edit(
        &self,
        workspace: &Path,
        rel: &str,
        op: &EditOperation,
    ) -> Result<String, MutationError> {
        let current = read_file(workspace, rel).await?;
        apply_edit(&current, op, rel)
    }

    /// Write `content` to `rel`, creating parent directories.
    pub async fn write(&self, workspace: &Path, rel: &str, content: &str) -> Result<(), MutationError> {
        let full = workspace.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MutationError::io(rel, e))?;
        }
        fs::write(&full, content)
            .await
            .map_err(|e| MutationError::io(rel, e))?;
        debug!(path = %full.display(), bytes = content.len(), "Wrote file");
        Ok(())
    }

    /// Stage `rel`, read its staged diff, and commit only that path.
    ///
    /// An empty staged diff means there is nothing to commit; the commit is
    /// skipped and `committed` is false.
    pub async fn commit(
        &self,
        workspace: &Path,
        rel: &str,
        description: &str,
        author: Option<&CommitAuthor>,
    ) -> Result<CommitOutcome, GitError> {
        self.git.stage(workspace, rel).await?;
        let diff = self.git.staged_diff(workspace, rel).await?;
        if diff.trim().is_empty() {
            debug!(rel, "No staged changes; skipping commit");
            return Ok(CommitOutcome {
                diff,
                committed: false,
            });
        }

        let message = style_commit_message(description);
        self.git.commit(workspace, rel, &message, author).await?;
        info!(rel, message = %message, "Committed file");
        Ok(CommitOutcome {
            diff,
            committed: true,
        })
    }

    /// Apply an edit in the workspace and commit it.
    ///
    /// Without a description the commit message is `Update <rel>`.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, ws, op), fields(rel = %ws.relative_path, replace_all = op.replace_all)))]
    pub async fn edit_and_commit(
        &self,
        ws: &ResolvedWorkspace,
        op: &EditOperation,
        description: Option<&str>,
    ) -> Result<CommitRecord, CoreError> {
        let timer = GLOBAL_METRICS.start("mutation.edit");
        let result = self.edit_inner(ws, op, description).await;
        timer.finish(result.is_ok());
        result
    }

    async fn edit_inner(
        &self,
        ws: &ResolvedWorkspace,
        op: &EditOperation,
        description: Option<&str>,
    ) -> Result<CommitRecord, CoreError> {
        let rel = ws.relative_path.as_str();
        let description = non_blank(description)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Update {}", rel));

        let before = read_file(&ws.workspace_path, rel).await?;
        let after = apply_edit(&before, op, rel)?;
        self.write(&ws.workspace_path, rel, &after).await?;
        let diff = normalize_indent(&compute_diff(rel, &before, &after));

        let outcome = self
            .commit(&ws.workspace_path, rel, &description, Some(&author_of(ws)))
            .await?;

        Ok(CommitRecord {
            relative_path: rel.to_string(),
            unified_diff: diff,
            description,
            committed: outcome.committed,
        })
    }

    /// Write a whole file in the workspace and commit it.
    ///
    /// Without a description the commit message is `Create <rel>`. The
    /// returned diff is the staged diff git reports.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, ws, content), fields(rel = %ws.relative_path, bytes = content.len())))]
    pub async fn write_and_commit(
        &self,
        ws: &ResolvedWorkspace,
        content: &str,
        description: Option<&str>,
    ) -> Result<CommitRecord, CoreError> {
        let timer = GLOBAL_METRICS.start("mutation.write");
        let result = self.write_inner(ws, content, description).await;
        timer.finish(result.is_ok());
        result
    }

    async fn write_inner(
        &self,
        ws: &ResolvedWorkspace,
        content: &str,
        description: Option<&str>,
    ) -> Result<CommitRecord, CoreError> {
        let rel = ws.relative_path.as_str();
        let description = non_blank(description)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Create {}", rel));

        self.write(&ws.workspace_path, rel, content).await?;
        let outcome = self
            .commit(&ws.workspace_path, rel, &description, Some(&author_of(ws)))
            .await?;

        Ok(CommitRecord {
            relative_path: rel.to_string(),
            unified_diff: outcome.diff,
            description,
            committed: outcome.committed,
        })
    }
}

fn author_of(ws: &ResolvedWorkspace) -> CommitAuthor {
    CommitAuthor::new(ws.user_name.clone(), ws.user_email.clone())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn read_file(workspace: &Path, rel: &str) -> Result<String, MutationError> {
    fs::read_to_string(workspace.join(rel))
        .await
        .map_err(|e| MutationError::io(rel, e))
}
