//! Deferred session starts.
//!
//! `SchedulingManager` turns a future wall-clock instant or a countdown delay
//! into a deferred start: a low-frequency timer updates a countdown channel
//! for display and, once the fire time is reached, hands the configuration to
//! the coordinator's immediate-start path. At most one request is outstanding
//! at a time; arming a new one implicitly cancels the old one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::ClickConfiguration;
use crate::coordinator::{ClickCoordinator, CoordinatorState};
use crate::error::{ClickError, Result};
use crate::timer::{PrecisionTimer, TimerHandle};

/// Cadence of countdown updates and fire-time checks.
const COUNTDOWN_TICK: Duration = Duration::from_millis(100);

/// One armed deferred start. Owned by the manager until it fires or is
/// cancelled.
struct ScheduleRequest {
    fire_at: SystemTime,
    timer: TimerHandle,
    cancelled: Arc<AtomicBool>,
}

pub struct SchedulingManager {
    coordinator: Arc<ClickCoordinator>,
    outstanding: Arc<Mutex<Option<ScheduleRequest>>>,
    countdown_tx: Arc<watch::Sender<Option<Duration>>>,
}

impl SchedulingManager {
    pub fn new(coordinator: Arc<ClickCoordinator>) -> Self {
        let (countdown_tx, _) = watch::channel(None);
        Self {
            coordinator,
            outstanding: Arc::new(Mutex::new(None)),
            countdown_tx: Arc::new(countdown_tx),
        }
    }

    /// Arm a start at a wall-clock instant. Rejected synchronously when
    /// `fire_at` is not in the future; no session is created.
    pub fn schedule_at(&self, config: ClickConfiguration, fire_at: SystemTime) -> Result<()> {
        let lead = fire_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        if lead.is_zero() {
            return Err(ClickError::ScheduleNotInFuture { lead });
        }
        self.arm(config, lead, fire_at, CoordinatorState::Scheduled)
    }

    /// Arm a start after a countdown delay.
    pub fn schedule_in(&self, config: ClickConfiguration, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Err(ClickError::ScheduleNotInFuture { lead: delay });
        }
        let fire_at = SystemTime::now() + delay;
        self.arm(config, delay, fire_at, CoordinatorState::Countdown)
    }

    fn arm(
        &self,
        config: ClickConfiguration,
        lead: Duration,
        fire_at: SystemTime,
        state: CoordinatorState,
    ) -> Result<()> {
        config.validate()?;

        // A new request implicitly cancels a prior one.
        self.cancel();
        self.coordinator.mark_deferred(state)?;

        let deadline = Instant::now() + lead;
        let (timer, mut ticks) = PrecisionTimer::start(COUNTDOWN_TICK, true);
        let cancelled = Arc::new(AtomicBool::new(false));

        *self.outstanding.lock().unwrap() = Some(ScheduleRequest {
            fire_at,
            timer: timer.clone(),
            cancelled: Arc::clone(&cancelled),
        });
        self.countdown_tx.send_replace(Some(lead));
        info!(lead_ms = lead.as_millis() as u64, "deferred start armed");

        let coordinator = Arc::clone(&self.coordinator);
        let outstanding = Arc::clone(&self.outstanding);
        let countdown_tx = Arc::clone(&self.countdown_tx);
        tokio::spawn(async move {
            let mut config = Some(config);
            loop {
                if ticks.recv().await.is_none() {
                    break;
                }
                if cancelled.load(Ordering::Acquire) || coordinator.cancel_requested() {
                    timer.stop();
                    coordinator.release_deferred_for_cancel();
                    break;
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                countdown_tx.send_replace(Some(remaining));

                if remaining.is_zero() {
                    timer.stop();
                    // Ownership of the config transfers to the new session.
                    if let Some(cfg) = config.take() {
                        if let Err(e) = coordinator.start_from_schedule(cfg) {
                            warn!(error = %e, "deferred start could not begin");
                        }
                    }
                    break;
                }
            }
            // A replacement request may already occupy the slot; only clean
            // up when it is still ours.
            let mut slot = outstanding.lock().unwrap();
            let still_ours = slot
                .as_ref()
                .map_or(false, |r| Arc::ptr_eq(&r.cancelled, &cancelled));
            if still_ours {
                *slot = None;
                countdown_tx.send_replace(None);
            }
        });
        Ok(())
    }

    /// Drop the outstanding request, if any. Idempotent.
    pub fn cancel(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        if let Some(request) = outstanding.take() {
            request.cancelled.store(true, Ordering::Release);
            request.timer.stop();
            drop(outstanding);
            self.coordinator.release_deferred_for_cancel();
            self.countdown_tx.send_replace(None);
            info!("deferred start cancelled");
        }
    }

    pub fn has_scheduled_task(&self) -> bool {
        self.outstanding.lock().unwrap().is_some()
    }

    /// Wall-clock fire time of the outstanding request.
    pub fn fire_at(&self) -> Option<SystemTime> {
        self.outstanding.lock().unwrap().as_ref().map(|r| r.fire_at)
    }

    /// Latest countdown value, `None` when nothing is armed.
    pub fn countdown(&self) -> Option<Duration> {
        *self.countdown_tx.borrow()
    }

    /// Subscribe to countdown updates for display.
    pub fn countdown_receiver(&self) -> watch::Receiver<Option<Duration>> {
        self.countdown_tx.subscribe()
    }
}
