//! Click-injection boundary.
//!
//! The engine performs no OS-level pointer injection itself; the host
//! supplies a [`ClickInjector`] at coordinator construction. Failures are
//! opaque reasons, not typed errors the engine interprets beyond
//! success/failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::config::{ClickType, Point};

/// Opaque failure reported by an injection attempt.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct InjectionError(String);

impl InjectionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// One pointer-click attempt at a resolved screen location.
///
/// Implementations must be safe to call from the tick-delivery context and
/// should return quickly; the coordinator invokes them under a timeout and
/// treats a timeout as a failure.
pub trait ClickInjector: Send + Sync {
    fn inject(&self, point: Point, click_type: ClickType) -> Result<(), InjectionError>;
}

/// Injector that logs each click instead of delivering it. Used for dry runs
/// and benchmarks; optionally sleeps to model real injection latency.
#[derive(Debug, Default)]
pub struct SimulatedInjector {
    latency: Duration,
    delivered: AtomicU64,
}

impl SimulatedInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            delivered: AtomicU64::new(0),
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl ClickInjector for SimulatedInjector {
    fn inject(&self, point: Point, click_type: ClickType) -> Result<(), InjectionError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let n = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        info!(x = point.x, y = point.y, ?click_type, n, "simulated click");
        Ok(())
    }
}
