//! Session statistics.
//!
//! `StatisticsTracker` is mutated only from the tick-delivery context; every
//! other context sees it exclusively through immutable [`StatsSnapshot`]
//! values published over a `watch` channel, so a consumer can never observe a
//! partial update.

use std::time::Duration;

use serde::Serialize;

/// Smoothing factor for the rolling execution-time average.
const LATENCY_EMA_ALPHA: f64 = 0.2;

/// Cumulative counters for one automation session. Counters survive
/// pause/resume; only active (non-paused) time counts toward `elapsed_active`.
#[derive(Debug, Default)]
pub struct StatisticsTracker {
    attempts: u64,
    successes: u64,
    failures: u64,
    timing_anomalies: u64,
    latency_ema_ms: f64,
    elapsed_active: Duration,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, execution_time: Duration) {
        self.attempts += 1;
        self.successes += 1;
        self.update_latency(execution_time);
    }

    pub fn record_failure(&mut self, execution_time: Duration) {
        self.attempts += 1;
        self.failures += 1;
        self.update_latency(execution_time);
    }

    pub fn record_anomaly(&mut self) {
        self.timing_anomalies += 1;
    }

    pub fn set_elapsed_active(&mut self, elapsed: Duration) {
        self.elapsed_active = elapsed;
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    fn update_latency(&mut self, execution_time: Duration) {
        let ms = execution_time.as_secs_f64() * 1_000.0;
        if self.attempts == 1 {
            self.latency_ema_ms = ms;
        } else {
            self.latency_ema_ms += LATENCY_EMA_ALPHA * (ms - self.latency_ema_ms);
        }
    }

    /// Immutable copy of the current totals.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts,
            successes: self.successes,
            failures: self.failures,
            timing_anomalies: self.timing_anomalies,
            avg_execution_ms: self.latency_ema_ms,
            elapsed_active: self.elapsed_active,
        }
    }
}

/// Point-in-time view of session statistics, safe to send across contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timing_anomalies: u64,
    /// Rolling average injection latency in milliseconds.
    pub avg_execution_ms: f64,
    /// Run time excluding paused spans.
    pub elapsed_active: Duration,
}

impl StatsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }
}
