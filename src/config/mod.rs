// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module.
//!
//! Handles loading and merging of configuration from multiple sources:
//! - Global config: ~/.codi/worktree.json
//! - Workspace config: .codi/worktree.json, .codi-worktree.json or .codi-worktree.yaml
//! - Local config: .codi-worktree.local.json (gitignored, for personal overrides)
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    get_global_config_dir, get_global_config_path, load_config_file, load_global_config,
    load_local_config, load_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
    LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{ResolvedConfig, ResolvedServerConfig, ServerConfig, WorktreeConfig};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a repository.
pub fn load_config(repo_root: &Path, cli_options: CliOptions) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(repo_root)?;
    let local = load_local_config(repo_root)?;

    Ok(merge_config(global, workspace, local, cli_options))
}
