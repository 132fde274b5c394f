// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics collection for performance monitoring.
//!
//! Lightweight in-process counters for git invocations, file mutations and
//! agent server supervision. Operation names are dotted, e.g. `git.commit`,
//! `mutation.edit`, `supervisor.spawn`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    operations: RwLock<HashMap<String, OperationMetrics>>,

    /// Agent server processes spawned since startup.
    processes_spawned: AtomicU64,

    /// Agent server processes observed to exit.
    processes_exited: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            processes_spawned: AtomicU64::new(0),
            processes_exited: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn read_ops(&self) -> RwLockReadGuard<'_, HashMap<String, OperationMetrics>> {
        self.operations.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_ops(&self) -> RwLockWriteGuard<'_, HashMap<String, OperationMetrics>> {
        self.operations.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a completed operation.
    pub fn record_operation(&self, name: &str, duration: Duration, success: bool) {
        let mut ops = self.write_ops();
        let metrics = ops.entry(name.to_string()).or_insert_with(OperationMetrics::new);
        metrics.record(duration, success);
    }

    /// Start timing an operation; call [`OperationTimer::finish`] when done.
    pub fn start(&'static self, name: impl Into<String>) -> OperationTimer {
        OperationTimer {
            metrics: self,
            name: name.into(),
            started: Instant::now(),
        }
    }

    pub fn record_spawn(&self) {
        self.processes_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit(&self) {
        self.processes_exited.fetch_add(1, Ordering::Relaxed);
    }

    /// Get metrics for a specific operation.
    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.read_ops().get(name).cloned()
    }

    /// Get uptime since metrics were initialized.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self
            .read_ops()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        MetricsSnapshot {
            operations,
            processes_spawned: self.processes_spawned.load(Ordering::Relaxed),
            processes_exited: self.processes_exited.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.write_ops().clear();
        self.processes_spawned.store(0, Ordering::Relaxed);
        self.processes_exited.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Running timer for one operation.
pub struct OperationTimer {
    metrics: &'static Metrics,
    name: String,
    started: Instant,
}

impl OperationTimer {
    /// Stop the timer and record the outcome.
    pub fn finish(self, success: bool) {
        self.metrics
            .record_operation(&self.name, self.started.elapsed(), success);
    }
}

/// Metrics for a named operation.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub count: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self {
            count: 0,
            failures: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, duration: Duration, success: bool) {
        self.count += 1;
        if !success {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }

    /// Calculate average duration.
    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Operation metrics, sorted by name.
    pub operations: BTreeMap<String, OperationMetrics>,
    pub processes_spawned: u64,
    pub processes_exited: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Metrics Report ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Agent servers: {} spawned, {} exited\n\n",
            self.processes_spawned, self.processes_exited
        ));

        if !self.operations.is_empty() {
            report.push_str("Operations:\n");
            for (name, m) in &self.operations {
                report.push_str(&format!(
                    "  {}: {} calls, {} failed, avg {:.2?}, max {:.2?}\n",
                    name,
                    m.count,
                    m.failures,
                    m.avg_duration(),
                    m.max_duration
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_metrics() {
        let mut m = OperationMetrics::new();
        m.record(Duration::from_millis(10), true);
        m.record(Duration::from_millis(30), false);

        assert_eq!(m.count, 2);
        assert_eq!(m.failures, 1);
        assert_eq!(m.avg_duration(), Duration::from_millis(20));
        assert_eq!(m.min_duration, Duration::from_millis(10));
        assert_eq!(m.max_duration, Duration::from_millis(30));
    }

    #[test]
    fn test_metrics_snapshot_and_reset() {
        let metrics = Metrics::new();
        metrics.record_operation("git.commit", Duration::from_millis(5), true);
        metrics.record_spawn();
        metrics.record_exit();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations["git.commit"].count, 1);
        assert_eq!(snapshot.processes_spawned, 1);
        assert!(snapshot.format_report().contains("git.commit"));

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert!(snapshot.operations.is_empty());
        assert_eq!(snapshot.processes_exited, 0);
    }

    #[test]
    fn test_global_timer() {
        let timer = GLOBAL_METRICS.start("test.timer");
        timer.finish(true);
        assert!(GLOBAL_METRICS.operation_metrics("test.timer").is_some());
    }
}
