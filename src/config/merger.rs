// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use super::types::{ResolvedConfig, ServerConfig, WorktreeConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub agent_dir: Option<String>,
    pub server_command: Option<String>,
    pub agent_profile: Option<String>,
    pub startup_timeout_ms: Option<u64>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.codi-worktree.local.json)
/// 3. Workspace config (.codi/worktree.json)
/// 4. Global config (~/.codi/worktree.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorktreeConfig>,
    workspace: Option<WorktreeConfig>,
    local: Option<WorktreeConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_worktree_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_worktree_config(result: &mut ResolvedConfig, config: &WorktreeConfig) {
    if let Some(ref dir) = config.agent_dir {
        result.agent_dir = dir.clone();
    }
    if let Some(ref dir) = config.worktree_dir {
        result.worktree_dir = dir.clone();
    }
    if let Some(ref domain) = config.email_domain {
        result.email_domain = domain.clone();
    }
    if let Some(ref prefix) = config.lazy_branch_prefix {
        result.lazy_branch_prefix = prefix.clone();
    }
    if let Some(ref prefix) = config.worktree_branch_prefix {
        result.worktree_branch_prefix = prefix.clone();
    }
    if let Some(ref tools) = config.shell_tools {
        result.shell_tools = tools.clone();
    }
    if let Some(ref server) = config.server {
        apply_server_config(result, server);
    }
}

fn apply_server_config(result: &mut ResolvedConfig, server: &ServerConfig) {
    let target = &mut result.server;
    if let Some(ref command) = server.command {
        target.command = command.clone();
    }
    if let Some(ref args) = server.args {
        target.args = args.clone();
    }
    if let Some(ref host) = server.host {
        target.host = host.clone();
    }
    if let Some(ref profile) = server.agent_profile {
        target.agent_profile = profile.clone();
    }
    if let Some(ms) = server.startup_timeout_ms {
        target.startup_timeout_ms = ms;
    }
    if let Some(ms) = server.startup_interval_ms {
        target.startup_interval_ms = ms;
    }
    if let Some(attempts) = server.reply_attempts {
        target.reply_attempts = attempts;
    }
    if let Some(ms) = server.reply_interval_ms {
        target.reply_interval_ms = ms;
    }
    if let Some(ms) = server.quick_reply_window_ms {
        target.quick_reply_window_ms = ms;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref dir) = cli.agent_dir {
        result.agent_dir = dir.clone();
    }
    if let Some(ref command) = cli.server_command {
        result.server.command = command.clone();
    }
    if let Some(ref profile) = cli.agent_profile {
        result.server.agent_profile = profile.clone();
    }
    if let Some(ms) = cli.startup_timeout_ms {
        result.server.startup_timeout_ms = ms;
    }
}
