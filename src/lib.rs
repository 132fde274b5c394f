// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Codi worktree - session isolation for concurrent coding agents.
//!
//! Each agent session gets a deterministic identity, an isolated git
//! worktree on its own branch, and single-file commits attributed to that
//! identity. Remote agents run as supervised server processes.
//!
//! # Architecture
//!
//! - [`identity`] - Deterministic agent names, authors and branches
//! - [`workspace`] - Git plumbing, the session registry and worktree manager
//! - [`mutation`] - Exact-match edits, unified diffs and scoped commits
//! - [`supervisor`] - Agent server processes and their control API
//! - [`intercept`] - Before/after hooks around tool calls
//! - [`orchestrator`] - Facade tying the subsystems together
//! - [`config`] - Configuration loading and merging
//! - [`error`] - Error types and result aliases
//! - [`telemetry`] - Tracing and metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use codi_worktree::config::{load_config, CliOptions};
//! use codi_worktree::mutation::EditOperation;
//! use codi_worktree::orchestrator::{EditRequest, Orchestrator};
//!
//! let config = load_config(repo, CliOptions::default())?;
//! let orchestrator = Orchestrator::new(repo, config);
//! let outcome = orchestrator
//!     .edit_file("session-1", &EditRequest::new(EditOperation::new("src/lib.rs", "foo", "bar"), None))
//!     .await?;
//! println!("{}", outcome.output);
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod intercept;
pub mod mutation;
pub mod orchestrator;
pub mod supervisor;
pub mod telemetry;
pub mod workspace;

pub use error::{ConfigError, CoreError, GitError, MutationError, Result, SupervisorError};
pub use identity::{AgentIdentity, IdentityResolver, IsolationPolicy};
pub use intercept::{CallInterceptor, EnrichedResult, ToolCall, ToolOutput};
pub use orchestrator::{EditRequest, MutationOutcome, Orchestrator, SpawnOutcome, WriteRequest};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
