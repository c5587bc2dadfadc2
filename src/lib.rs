//! # Precision Clicker
//!
//! A cross-platform library and command-line tool for automating pointer
//! clicks at a configured location and cadence, built around a drift-free
//! scheduling engine.
//!
//! ## Features
//!
//! - Absolute-deadline timing that never accumulates drift across long runs
//! - Optional interval and location jitter, bounded and seedable
//! - Duration policies: unlimited, time limit, or exact click count
//! - Pause/resume that freezes remaining time to the next click
//! - Deferred starts at a wall-clock time or after a countdown
//! - Lock-free emergency stop, safe from a global-hotkey thread
//! - Self-measured timing accuracy with regression detection
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use precision_clicker::{
//!     ClickConfiguration, ClickCoordinator, DurationPolicy, Point, SimulatedInjector,
//! };
//!
//! #[tokio::main]
//! async fn main() -> precision_clicker::Result<()> {
//!     let coordinator = ClickCoordinator::new(Arc::new(SimulatedInjector::new()));
//!
//!     let mut config = ClickConfiguration::new(Point::new(640.0, 360.0), 250);
//!     config.duration_policy = DurationPolicy::ClickCount { count: 100 };
//!     coordinator.start(config)?;
//!
//!     let mut updates = coordinator.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let snapshot = updates.borrow().clone();
//!         if snapshot.stop_reason.is_some() {
//!             println!("done after {} clicks", snapshot.stats.attempts);
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Profiles can be provided via JSON files:
//!
//! ```json
//! {
//!   "target_x": 640.0,
//!   "target_y": 360.0,
//!   "interval": "250ms",
//!   "click_count": 100,
//!   "interval_jitter_ratio": 0.1,
//!   "emergency_hotkey": "ctrl+alt+x"
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hotkey;
pub mod injector;
pub mod jitter;
pub mod process_finder;
pub mod scheduler;
pub mod stats;
pub mod timer;
pub mod validator;

pub use config::{
    ClickConfiguration, ClickProfile, ClickType, DisplayBounds, DurationPolicy, Point,
};
pub use coordinator::{ClickCoordinator, CoordinatorState, SessionSnapshot, StopReason};
pub use error::{ClickError, Result};
pub use hotkey::HotkeyManager;
pub use injector::{ClickInjector, InjectionError, SimulatedInjector};
pub use process_finder::{ProcessFinder, ProcessRef};
pub use scheduler::SchedulingManager;
pub use stats::StatsSnapshot;
pub use timer::{PrecisionTimer, TimerHandle, TimingSample};
pub use validator::{detect_regression, TimingAccuracyReport, TimingAccuracyValidator};
