// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for session isolation.
//!
//! Each subsystem has its own `thiserror` enum. [`CoreError`] wraps all of them
//! for the orchestrator facade, and `anyhow` is used for propagation in the
//! binary.

use thiserror::Error;

/// Errors raised while computing or applying a file mutation.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("oldString not found in content of {path}: {needle}")]
    NotFound { path: String, needle: String },

    #[error(
        "oldString found {count} times in {path} and requires more code context \
         to uniquely identify the intended match: {needle}"
    )]
    AmbiguousMatch {
        path: String,
        needle: String,
        count: usize,
    },

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("IO error on {path}: {message}")]
    Io { path: String, message: String },
}

impl MutationError {
    /// Build an IO error tagged with the file it happened on.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Validation failures are the caller's fault and are never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::AmbiguousMatch { .. } | Self::InvalidEdit(_)
        )
    }
}

/// Errors from invoking the `git` executable.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("IO error running git: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Whether the failure reports that the target already exists.
    ///
    /// This is the only git failure the workspace manager recovers from.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => stderr.contains("already exists"),
            Self::Io(_) => false,
        }
    }
}

/// Errors from supervising remote agent processes.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Agent server {name} did not become ready on port {port} within {timeout_ms}ms")]
    StartupTimeout {
        name: String,
        port: u16,
        timeout_ms: u64,
    },

    #[error("Failed to create session on agent server {name} (port={port})")]
    SessionCreation { name: String, port: u16 },

    #[error("Remote process died while prompting (name={name} port={port} session={session_id})")]
    ProcessDied {
        name: String,
        port: u16,
        session_id: String,
    },

    #[error("Could not allocate a free port: {0}")]
    PortAllocation(String),

    #[error("Failed to spawn agent server {name}: {message}")]
    Spawn { name: String, message: String },

    #[error("Control API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Session {0} not running")]
    NotRunning(String),
}

impl SupervisorError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status_code: None,
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Top-level error returned by the orchestrator facade.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Workspace isolation cannot be changed for session {0}")]
    WorkspaceLocked(String),

    #[error("No workspace for agent {0}")]
    WorkspaceNotFound(String),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Reject blank values for required human-readable arguments.
    pub fn require<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, CoreError> {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(Self::MissingArgument(name.to_string())),
        }
    }
}

/// Result type alias defaulting to `anyhow` errors.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
