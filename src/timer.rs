//! Drift-free repeating timer with pause/resume and lock-free cancellation.
//!
//! The timer schedules against absolute monotonic deadlines: each fire's next
//! deadline is `previous_deadline + interval`, never `now + interval`, so
//! callback latency never accumulates into drift. Ticks are delivered over a
//! bounded channel (capacity 1), which keeps ticks strictly ordered and
//! non-overlapping for a single consumer.
//!
//! Stopping the timer is a single atomic store plus a wakeup notification; no
//! lock is ever taken on the control path, so `stop` is safe to call from any
//! thread (including a global-hotkey listener) while a tick is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

/// One scheduled firing of the timer.
///
/// `error()` measures how late (or, bounded by the sleep primitive, how early)
/// the wake-up landed relative to the intended deadline. A sample is flagged
/// as an `anomaly` when it fired more than one full interval past its
/// deadline; the timer then resynchronizes to `now + interval` instead of
/// bursting delayed fires.
#[derive(Debug, Clone, Copy)]
pub struct TimingSample {
    pub scheduled_for: Instant,
    pub fired_at: Instant,
    pub anomaly: bool,
}

impl TimingSample {
    /// Absolute timing error of this fire.
    pub fn error(&self) -> Duration {
        if self.fired_at >= self.scheduled_for {
            self.fired_at.saturating_duration_since(self.scheduled_for)
        } else {
            self.scheduled_for.saturating_duration_since(self.fired_at)
        }
    }
}

/// Control handle for a running timer. All methods are non-blocking and
/// idempotent; the handle can be cloned and signalled from any thread.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
    pause_tx: Arc<watch::Sender<bool>>,
    interval_tx: Arc<watch::Sender<Duration>>,
}

impl TimerHandle {
    /// Freeze the remaining time to the next deadline.
    pub fn pause(&self) {
        let _ = self.pause_tx.send(true);
    }

    /// Change the gap used for deadlines armed after the current one. The
    /// coordinator uses this to apply per-tick interval jitter.
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.interval_tx.send(interval.max(Duration::from_millis(1)));
    }

    /// Rearm the next deadline at `now + remaining`.
    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
    }

    /// Stop the timer. Single atomic store plus wakeup; never blocks.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wakeup.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }
}

/// Factory for absolute-deadline timers. The timer task runs on the current
/// tokio runtime; dropping the tick receiver stops it.
pub struct PrecisionTimer;

impl PrecisionTimer {
    /// Start a timer firing every `interval`, delivering one `TimingSample`
    /// per tick. With `repeating` false the timer fires once and exits.
    pub fn start(interval: Duration, repeating: bool) -> (TimerHandle, mpsc::Receiver<TimingSample>) {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let wakeup = Arc::new(Notify::new());
        let (pause_tx, pause_rx) = watch::channel(false);
        let (interval_tx, interval_rx) = watch::channel(interval.max(Duration::from_millis(1)));

        let handle = TimerHandle {
            cancelled: Arc::clone(&cancelled),
            wakeup: Arc::clone(&wakeup),
            pause_tx: Arc::new(pause_tx),
            interval_tx: Arc::new(interval_tx),
        };

        tokio::spawn(run_loop(
            repeating,
            tick_tx,
            cancelled,
            wakeup,
            pause_rx,
            interval_rx,
        ));

        (handle, tick_rx)
    }
}

async fn run_loop(
    repeating: bool,
    tick_tx: mpsc::Sender<TimingSample>,
    cancelled: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
    mut pause_rx: watch::Receiver<bool>,
    interval_rx: watch::Receiver<Duration>,
) {
    let mut deadline = Instant::now() + *interval_rx.borrow();

    loop {
        let interval = *interval_rx.borrow();
        if !wait_until(&mut deadline, &cancelled, &wakeup, &mut pause_rx).await {
            return;
        }

        let fired_at = Instant::now();
        // Cancellation check at the top of every tick, before any delivery.
        if cancelled.load(Ordering::Acquire) {
            return;
        }

        let anomaly = fired_at.saturating_duration_since(deadline) > interval;
        let sample = TimingSample {
            scheduled_for: deadline,
            fired_at,
            anomaly,
        };

        // Capacity-1 channel: the next deadline is only armed after this
        // tick's delivery is queued, so ticks never overlap.
        if tick_tx.send(sample).await.is_err() {
            debug!("tick receiver dropped, stopping timer");
            return;
        }

        if !repeating {
            return;
        }

        if cancelled.load(Ordering::Acquire) {
            return;
        }

        // Re-read the interval so a `set_interval` made while this tick was
        // being consumed takes effect on the next armed deadline.
        let next_gap = *interval_rx.borrow();
        deadline = if anomaly {
            // Missed by more than one interval (system sleep, throttling).
            // Resynchronize instead of bursting delayed fires.
            warn!(late_ms = sample.error().as_millis() as u64, "timer fell behind, resynchronizing");
            fired_at + next_gap
        } else {
            deadline + next_gap
        };
    }
}

/// Sleep until `deadline`, honoring pause and stop. Returns false when the
/// timer should exit. On resume after a pause, `deadline` is rewritten to
/// `now + remaining`, where `remaining` was frozen at pause time.
async fn wait_until(
    deadline: &mut Instant,
    cancelled: &AtomicBool,
    wakeup: &Notify,
    pause_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if cancelled.load(Ordering::Acquire) {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(*deadline) => return true,
            _ = wakeup.notified() => {
                if cancelled.load(Ordering::Acquire) {
                    return false;
                }
            }
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
                if *pause_rx.borrow_and_update() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if !wait_while_paused(cancelled, wakeup, pause_rx).await {
                        return false;
                    }
                    *deadline = Instant::now() + remaining;
                }
            }
        }
    }
}

/// Block (asynchronously) until unpaused or stopped. Returns false on stop.
async fn wait_while_paused(
    cancelled: &AtomicBool,
    wakeup: &Notify,
    pause_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            _ = wakeup.notified() => {
                if cancelled.load(Ordering::Acquire) {
                    return false;
                }
            }
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
                if !*pause_rx.borrow_and_update() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn test_deadlines_are_drift_free() {
        let interval = Duration::from_millis(50);
        let (handle, mut ticks) = PrecisionTimer::start(interval, true);

        let mut samples = Vec::new();
        for _ in 0..5 {
            samples.push(ticks.recv().await.unwrap());
        }
        handle.stop();

        // Scheduled deadlines advance by exactly one interval per tick,
        // independent of wake latency.
        for pair in samples.windows(2) {
            if pair[1].anomaly {
                continue;
            }
            let delta = pair[1]
                .scheduled_for
                .saturating_duration_since(pair[0].scheduled_for);
            assert_eq!(delta, interval);
        }
    }

    #[tokio::test]
    async fn test_single_shot_fires_once() {
        let (_handle, mut ticks) = PrecisionTimer::start(Duration::from_millis(10), false);
        assert!(ticks.recv().await.is_some());
        assert!(ticks.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_returns_promptly() {
        let (handle, mut ticks) = PrecisionTimer::start(Duration::from_millis(20), true);
        ticks.recv().await.unwrap();

        let started = StdInstant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_millis(5));
        assert!(handle.is_stopped());

        // Channel drains and closes once the task observes the flag.
        while ticks.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (handle, _ticks) = PrecisionTimer::start(Duration::from_millis(20), true);
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_pause_freezes_remaining_time() {
        let interval = Duration::from_millis(200);
        let (handle, mut ticks) = PrecisionTimer::start(interval, true);

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.pause();
        assert!(handle.is_paused());

        // An arbitrary wall-clock delay while paused.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let resumed_at = StdInstant::now();
        handle.resume();
        let sample = ticks.recv().await.unwrap();
        let after_resume = resumed_at.elapsed();
        handle.stop();

        // Remaining was ~150ms at pause time; the next tick lands at
        // resume + remaining, not resume + interval.
        assert!(
            after_resume >= Duration::from_millis(100) && after_resume < Duration::from_millis(200),
            "tick after resume at {after_resume:?}, expected ~150ms"
        );
        assert!(!sample.anomaly);
    }

    #[tokio::test]
    async fn test_set_interval_applies_to_later_deadlines() {
        let (handle, mut ticks) = PrecisionTimer::start(Duration::from_millis(40), true);

        let _first = ticks.recv().await.unwrap();
        handle.set_interval(Duration::from_millis(120));

        let second = ticks.recv().await.unwrap();
        let third = ticks.recv().await.unwrap();
        handle.stop();

        if !second.anomaly && !third.anomaly {
            let delta = third
                .scheduled_for
                .saturating_duration_since(second.scheduled_for);
            assert_eq!(delta, Duration::from_millis(120));
        }
    }

    #[tokio::test]
    async fn test_sample_error_measures_lateness() {
        let now = Instant::now();
        let sample = TimingSample {
            scheduled_for: now,
            fired_at: now + Duration::from_millis(3),
            anomaly: false,
        };
        assert_eq!(sample.error(), Duration::from_millis(3));
    }
}
