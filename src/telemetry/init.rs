// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! The level applies to this crate; dependencies (hyper, reqwest) are held
//! at `warn` unless `RUST_LOG` says otherwise.

use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const CRATE_TARGET: &str = "codi_worktree";

/// How the subscriber is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Level for this crate's targets.
    pub level: Level,

    /// Log span close events with their busy/idle timings.
    pub span_timings: bool,

    /// Include source file and line.
    pub source_location: bool,

    pub ansi_colors: bool,

    /// Overrides both `RUST_LOG` and `level`.
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            span_timings: false,
            source_location: false,
            ansi_colors: io::stderr().is_terminal(),
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Debug output with span timings, for diagnosing agent servers.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            span_timings: true,
            source_location: true,
            ..Self::default()
        }
    }

    /// Everything from this crate, no colors.
    pub fn testing() -> Self {
        Self {
            level: Level::TRACE,
            span_timings: true,
            source_location: true,
            ansi_colors: false,
            filter_directive: None,
        }
    }

    /// Pick a config from CLI verbosity flags.
    ///
    /// `debug` wins over `verbose`; with neither, only warnings are shown.
    pub fn from_verbosity(verbose: bool, debug: bool) -> Self {
        if debug {
            Self::development()
        } else if verbose {
            Self::default()
        } else {
            Self::default().with_level(Level::WARN)
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    /// The filter directive this config resolves to, ignoring `RUST_LOG`.
    pub fn directive(&self) -> String {
        match &self.filter_directive {
            Some(directive) => directive.clone(),
            None => format!("warn,{}={}", CRATE_TARGET, self.level),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.directive());
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Handle returned by [`init_telemetry`].
///
/// Keep this guard alive for the duration of your program.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber. Fails if one is already installed.
///
/// ```rust,ignore
/// use codi_worktree::telemetry::{init_telemetry, TelemetryConfig};
///
/// let _guard = init_telemetry(&TelemetryConfig::from_verbosity(true, false))?;
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(span_events)
        .compact();

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
