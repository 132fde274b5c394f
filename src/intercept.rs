// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hooks around generic tool execution.
//!
//! Before a tool runs, calls tagged with a session that has a workspace are
//! redirected into it. After it runs, a richer result produced by a mutation
//! replaces the tool's plain return value exactly once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::workspace::WorkspaceManager;

/// A tool invocation as seen by the dispatch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub session: String,
    pub call_id: String,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(
        session: impl Into<String>,
        call_id: impl Into<String>,
        tool: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            session: session.into(),
            call_id: call_id.into(),
            tool: tool.into(),
            args,
        }
    }
}

/// Title, output and metadata shown to the requester for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub title: String,
    pub output: String,
    pub metadata: Value,
}

/// What a tool returned.
///
/// `enriched` carries a richer result computed by the tool itself; the after
/// hook promotes it over the plain fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub title: String,
    pub output: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched: Option<EnrichedResult>,
}

impl ToolOutput {
    pub fn plain(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_enriched(mut self, enriched: EnrichedResult) -> Self {
        self.enriched = Some(enriched);
        self
    }
}

/// Before/after hooks for tool calls.
#[derive(Clone)]
pub struct CallInterceptor {
    workspaces: Arc<WorkspaceManager>,
    root_directory: PathBuf,
}

impl CallInterceptor {
    /// Relative workspace paths are resolved against `root_directory`.
    pub fn new(workspaces: Arc<WorkspaceManager>, root_directory: impl AsRef<Path>) -> Self {
        Self {
            workspaces,
            root_directory: root_directory.as_ref().to_path_buf(),
        }
    }

    /// Route the call into its session's workspace.
    ///
    /// Returns whether the session has a workspace. Calls whose `args` is not
    /// an object are left alone.
    pub fn before(&self, call: &mut ToolCall) -> bool {
        if !call.args.is_object() {
            return false;
        }
        if self.workspaces.registry().workspace_path(&call.session).is_none() {
            return false;
        }
        self.workspaces
            .route(&call.session, &call.tool, &mut call.args, &self.root_directory);
        debug!(session = %call.session, tool = %call.tool, "Routed tool call into workspace");
        true
    }

    /// Replace the plain result with the enriched one, if present.
    ///
    /// The enrichment is consumed, so a second call is a no-op.
    pub fn after(&self, output: &mut ToolOutput) -> bool {
        let Some(enriched) = output.enriched.take() else {
            return false;
        };
        debug!(replaced = %output.title, title = %enriched.title, "Applied enriched tool result");
        output.title = enriched.title;
        output.output = enriched.output;
        output.metadata = enriched.metadata;
        true
    }
}
