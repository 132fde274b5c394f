// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing and metrics infrastructure.
//!
//! - **Tracing**: structured logging through `tracing`, with
//!   `#[instrument]` spans on mutation and supervision entry points
//! - **Metrics**: counters and durations for git calls, mutations and
//!   agent server lifecycles
//!
//! # Usage
//!
//! ```rust,ignore
//! use codi_worktree::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{Metrics, MetricsSnapshot, OperationMetrics, OperationTimer, GLOBAL_METRICS};
