// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`WorktreeConfig`] is the on-disk form where every field is optional.
//! [`ResolvedConfig`] is the merged result with all defaults filled in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worktree isolation configuration.
/// Can be defined in .codi/worktree.json or .codi-worktree.json in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeConfig {
    /// Directory holding agent state, relative to the repository root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_dir: Option<String>,

    /// Subdirectory of `agent_dir` holding the workspaces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_dir: Option<String>,

    /// Domain used for derived commit author emails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_domain: Option<String>,

    /// Branch namespace for lazy (shared checkout) agents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lazy_branch_prefix: Option<String>,

    /// Branch namespace for worktree agents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_branch_prefix: Option<String>,

    /// Tools whose `command` argument is a shell command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_tools: Option<Vec<String>>,

    /// Agent server settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// Agent server settings as written in a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Executable to launch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments; `{port}` is replaced with the allocated port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Host the server listens on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Agent profile passed with each prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_profile: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_interval_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_interval_ms: Option<u64>,

    /// How long a new agent waits for an immediate reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_reply_window_ms: Option<u64>,
}

/// Fully resolved agent server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub host: String,
    pub agent_profile: String,
    pub startup_timeout_ms: u64,
    pub startup_interval_ms: u64,
    pub reply_attempts: u32,
    pub reply_interval_ms: u64,
    pub quick_reply_window_ms: u64,
}

impl Default for ResolvedServerConfig {
    fn default() -> Self {
        Self {
            command: "opencode".to_string(),
            args: vec!["serve".to_string(), "--port={port}".to_string()],
            host: "127.0.0.1".to_string(),
            agent_profile: "build".to_string(),
            startup_timeout_ms: 15_000,
            startup_interval_ms: 200,
            reply_attempts: 50,
            reply_interval_ms: 200,
            quick_reply_window_ms: 200,
        }
    }
}

impl ResolvedServerConfig {
    /// Arguments with the `{port}` placeholder substituted.
    pub fn args_for_port(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args.iter().map(|a| a.replace("{port}", &port)).collect()
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn startup_interval(&self) -> Duration {
        Duration::from_millis(self.startup_interval_ms)
    }

    pub fn reply_interval(&self) -> Duration {
        Duration::from_millis(self.reply_interval_ms)
    }

    pub fn quick_reply_window(&self) -> Duration {
        Duration::from_millis(self.quick_reply_window_ms)
    }
}

/// Fully resolved configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub agent_dir: String,
    pub worktree_dir: String,
    pub email_domain: String,
    pub lazy_branch_prefix: String,
    pub worktree_branch_prefix: String,
    pub shell_tools: Vec<String>,
    pub server: ResolvedServerConfig,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            agent_dir: ".agent".to_string(),
            worktree_dir: "wt".to_string(),
            email_domain: "opencode.ai".to_string(),
            lazy_branch_prefix: "opencode".to_string(),
            worktree_branch_prefix: "opencode".to_string(),
            shell_tools: vec!["bash".to_string()],
            server: ResolvedServerConfig::default(),
        }
    }
}
