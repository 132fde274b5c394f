// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::WorktreeConfig;

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".codi/worktree.json",
    ".codi-worktree.json",
    ".codi-worktree.yaml",
];

/// Local config file name (for per-directory overrides).
pub const LOCAL_CONFIG_FILE: &str = ".codi-worktree.local.json";

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".codi";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "worktree.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.codi/worktree.json.
pub fn load_global_config() -> Result<Option<WorktreeConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the repository root.
///
/// The first file in [`CONFIG_FILES`] that exists wins.
pub fn load_workspace_config(repo_root: &Path) -> Result<Option<WorktreeConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = repo_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load local configuration from .codi-worktree.local.json.
pub fn load_local_config(repo_root: &Path) -> Result<Option<WorktreeConfig>, ConfigError> {
    let path = repo_root.join(LOCAL_CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<WorktreeConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}
