// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bounded retry loops driven by an injectable clock.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Source of time for retry loops.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that advances only when slept on. Sleeps return immediately.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: Instant,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.now += duration;
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .sleeps
            .clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).now
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.now += duration;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// When a retry loop gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Give up after this many waits.
    Attempts(u32),
    /// Give up once this much time has passed since the loop started.
    Deadline(Duration),
}

/// What to do after an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Sleep for this long, then try again.
    Wait(Duration),
    /// Stop trying.
    Exhausted,
}

/// State for one bounded retry loop.
///
/// ```
/// use codi_worktree::supervisor::{BoundedRetry, RetryStep};
/// use std::time::{Duration, Instant};
///
/// let mut retry = BoundedRetry::attempts(2, Duration::from_millis(10));
/// let now = Instant::now();
/// assert_eq!(retry.next_step(now), RetryStep::Wait(Duration::from_millis(10)));
/// assert_eq!(retry.next_step(now), RetryStep::Wait(Duration::from_millis(10)));
/// assert_eq!(retry.next_step(now), RetryStep::Exhausted);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedRetry {
    limit: RetryLimit,
    interval: Duration,
    waits: u32,
    started: Option<Instant>,
}

impl BoundedRetry {
    pub fn attempts(max: u32, interval: Duration) -> Self {
        Self {
            limit: RetryLimit::Attempts(max),
            interval,
            waits: 0,
            started: None,
        }
    }

    pub fn deadline(timeout: Duration, interval: Duration) -> Self {
        Self {
            limit: RetryLimit::Deadline(timeout),
            interval,
            waits: 0,
            started: None,
        }
    }

    /// Anchor the deadline. Otherwise the first `next_step` call does.
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    /// Number of waits handed out so far.
    pub fn waits(&self) -> u32 {
        self.waits
    }

    pub fn limit(&self) -> RetryLimit {
        self.limit
    }

    pub fn next_step(&mut self, now: Instant) -> RetryStep {
        let started = *self.started.get_or_insert(now);
        match self.limit {
            RetryLimit::Attempts(max) => {
                if self.waits >= max {
                    return RetryStep::Exhausted;
                }
                self.waits += 1;
                RetryStep::Wait(self.interval)
            }
            RetryLimit::Deadline(timeout) => {
                let elapsed = now.saturating_duration_since(started);
                if elapsed >= timeout {
                    return RetryStep::Exhausted;
                }
                self.waits += 1;
                RetryStep::Wait(self.interval.min(timeout - elapsed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_limit() {
        let mut retry = BoundedRetry::attempts(3, Duration::from_millis(200));
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(retry.next_step(now), RetryStep::Wait(Duration::from_millis(200)));
        }
        assert_eq!(retry.next_step(now), RetryStep::Exhausted);
        assert_eq!(retry.waits(), 3);
    }

    #[test]
    fn test_zero_attempts() {
        let mut retry = BoundedRetry::attempts(0, Duration::from_millis(200));
        assert_eq!(retry.next_step(Instant::now()), RetryStep::Exhausted);
    }

    #[test]
    fn test_deadline_clamps_last_wait() {
        let start = Instant::now();
        let mut retry = BoundedRetry::deadline(Duration::from_millis(500), Duration::from_millis(200));
        retry.start(start);

        assert_eq!(retry.next_step(start), RetryStep::Wait(Duration::from_millis(200)));
        let later = start + Duration::from_millis(400);
        assert_eq!(retry.next_step(later), RetryStep::Wait(Duration::from_millis(100)));
        let done = start + Duration::from_millis(500);
        assert_eq!(retry.next_step(done), RetryStep::Exhausted);
    }

    #[tokio::test]
    async fn test_manual_clock_drives_deadline() {
        let clock = ManualClock::new();
        let mut retry = BoundedRetry::deadline(Duration::from_secs(1), Duration::from_millis(300));
        retry.start(clock.now());

        while let RetryStep::Wait(d) = retry.next_step(clock.now()) {
            clock.sleep(d).await;
        }

        assert_eq!(clock.total_slept(), Duration::from_secs(1));
        assert_eq!(clock.sleeps().len(), 4);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now() - before, Duration::from_secs(2));
        assert!(clock.sleeps().is_empty());
    }
}
