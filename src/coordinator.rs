//! Session orchestration.
//!
//! `ClickCoordinator` owns the state machine
//! `Idle → Scheduled → Countdown → Running ⇄ Paused → Stopped → Idle` and
//! drives one `AutomationSession` at a time. A single tokio task (the tick
//! task) consumes timer ticks and is the only context that mutates session
//! statistics; every other context interacts through lock-free signals
//! (cancellation flags, watch-channel snapshots), never by blocking on the
//! tick task.
//!
//! `emergency_stop` is a single atomic store plus wakeups. It never takes the
//! coordinator's control lock, so a global-hotkey thread can fire it while a
//! tick is mid-injection without any risk of deadlock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{ClickConfiguration, DurationPolicy};
use crate::error::{ClickError, Result};
use crate::injector::ClickInjector;
use crate::jitter;
use crate::stats::{StatisticsTracker, StatsSnapshot};
use crate::timer::{PrecisionTimer, TimerHandle, TimingSample};

/// Default budget for one injection call before it counts as a failure.
const DEFAULT_INJECTION_TIMEOUT: Duration = Duration::from_millis(250);

/// Coordinator states. `Stopped` appears only in the final snapshot of a
/// session; the state cell itself returns to `Idle` once a session is
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorState {
    Idle,
    Scheduled,
    Countdown,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorState::Idle => "Idle",
            CoordinatorState::Scheduled => "Scheduled",
            CoordinatorState::Countdown => "Countdown",
            CoordinatorState::Running => "Running",
            CoordinatorState::Paused => "Paused",
            CoordinatorState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Why a session reached `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Manual,
    Emergency,
    PolicySatisfied,
    InjectionError(String),
}

/// Immutable view of the coordinator published after every state change and
/// every tick. Consumers poll or subscribe; they never see partial updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: CoordinatorState,
    pub stats: StatsSnapshot,
    pub stop_reason: Option<StopReason>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            state: CoordinatorState::Idle,
            stats: StatsSnapshot::default(),
            stop_reason: None,
        }
    }
}

/// Lock-free state cell readable from any context.
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: CoordinatorState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> CoordinatorState {
        match self.0.load(Ordering::Acquire) {
            0 => CoordinatorState::Idle,
            1 => CoordinatorState::Scheduled,
            2 => CoordinatorState::Countdown,
            3 => CoordinatorState::Running,
            4 => CoordinatorState::Paused,
            _ => CoordinatorState::Stopped,
        }
    }

    fn store(&self, state: CoordinatorState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `to` if the current state is any of `from`.
    fn transition(&self, from: &[CoordinatorState], to: CoordinatorState) -> bool {
        for &candidate in from {
            if self
                .0
                .compare_exchange(
                    candidate as u8,
                    to as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
        false
    }
}

#[derive(Default)]
struct Control {
    timer: Option<TimerHandle>,
    pause_started: Option<Instant>,
}

/// Everything the tick task needs, cloned out of the coordinator so the task
/// never borrows it.
#[derive(Clone)]
struct SessionCtx {
    injector: Arc<dyn ClickInjector>,
    injection_timeout: Duration,
    state: Arc<StateCell>,
    cancel: Arc<AtomicBool>,
    emergency: Arc<AtomicBool>,
    cancel_wake: Arc<Notify>,
    paused_micros: Arc<AtomicU64>,
    snapshot_tx: Arc<watch::Sender<SessionSnapshot>>,
    control: Arc<Mutex<Control>>,
}

/// Orchestrates click sessions against an injected click-execution
/// dependency. Construct one per host process; there is no global instance.
pub struct ClickCoordinator {
    ctx: SessionCtx,
    emergency_tx: Arc<watch::Sender<bool>>,
    rng_seed: Option<u64>,
}

impl ClickCoordinator {
    pub fn new(injector: Arc<dyn ClickInjector>) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::idle());
        let (emergency_tx, _) = watch::channel(false);
        Self {
            ctx: SessionCtx {
                injector,
                injection_timeout: DEFAULT_INJECTION_TIMEOUT,
                state: Arc::new(StateCell::new(CoordinatorState::Idle)),
                cancel: Arc::new(AtomicBool::new(false)),
                emergency: Arc::new(AtomicBool::new(false)),
                cancel_wake: Arc::new(Notify::new()),
                paused_micros: Arc::new(AtomicU64::new(0)),
                snapshot_tx: Arc::new(snapshot_tx),
                control: Arc::new(Mutex::new(Control::default())),
            },
            emergency_tx: Arc::new(emergency_tx),
            rng_seed: None,
        }
    }

    /// Budget for one injection call; a timeout counts as a failure.
    pub fn with_injection_timeout(mut self, timeout: Duration) -> Self {
        self.ctx.injection_timeout = timeout;
        self
    }

    /// Seed the jitter rng, making a session's randomization deterministic.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.ctx.state.load()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.ctx.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot updates (one per tick and per state change).
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.ctx.snapshot_tx.subscribe()
    }

    /// Side-channel that flips to `true` when an emergency stop fires,
    /// observable from any context without touching coordinator locks.
    pub fn emergency_signal(&self) -> watch::Receiver<bool> {
        self.emergency_tx.subscribe()
    }

    /// Start a session immediately. Fails synchronously on invalid
    /// configuration or when the coordinator is not `Idle`.
    pub fn start(&self, config: ClickConfiguration) -> Result<()> {
        self.begin(config, &[CoordinatorState::Idle])
    }

    /// Immediate-start path used by the scheduler when a deferred start
    /// fires.
    pub(crate) fn start_from_schedule(&self, config: ClickConfiguration) -> Result<()> {
        self.begin(
            config,
            &[CoordinatorState::Scheduled, CoordinatorState::Countdown],
        )
    }

    fn begin(&self, config: ClickConfiguration, from: &[CoordinatorState]) -> Result<()> {
        config.validate()?;

        let mut ctl = self.ctx.control.lock().unwrap();
        if !self.ctx.state.transition(from, CoordinatorState::Running) {
            return Err(ClickError::invalid_transition(
                self.state().to_string(),
                "start",
            ));
        }

        // Fresh session: stale flags and counters never leak into a new run.
        self.ctx.cancel.store(false, Ordering::Release);
        self.ctx.emergency.store(false, Ordering::Release);
        self.ctx.paused_micros.store(0, Ordering::Release);
        ctl.pause_started = None;

        let mut rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let first_interval = if config.interval_jitter_ratio > 0.0 {
            jitter::jitter_interval(&mut rng, config.base_interval(), config.interval_jitter_ratio)
        } else {
            config.base_interval()
        };

        let (timer, ticks) = PrecisionTimer::start(first_interval, true);
        ctl.timer = Some(timer.clone());

        // Snapshots are published while holding the control lock, which keeps
        // them in the same order as the state transitions they describe.
        self.ctx.snapshot_tx.send_replace(SessionSnapshot {
            state: CoordinatorState::Running,
            stats: StatsSnapshot::default(),
            stop_reason: None,
        });
        drop(ctl);
        info!(
            interval_ms = config.base_interval_ms,
            policy = ?config.duration_policy,
            "session started"
        );

        let ctx = self.ctx.clone();
        tokio::spawn(run_session(ctx, config, timer, ticks, rng));
        Ok(())
    }

    /// Freeze the session. Statistics keep their cumulative totals across the
    /// pause boundary; paused time does not count toward a time limit.
    pub fn pause(&self) -> Result<()> {
        let mut ctl = self.ctx.control.lock().unwrap();
        if !self
            .ctx
            .state
            .transition(&[CoordinatorState::Running], CoordinatorState::Paused)
        {
            return Err(ClickError::invalid_transition(
                self.state().to_string(),
                "pause",
            ));
        }
        if let Some(timer) = &ctl.timer {
            timer.pause();
        }
        ctl.pause_started = Some(Instant::now());

        let stats = self.ctx.snapshot_tx.borrow().stats;
        self.ctx.snapshot_tx.send_replace(SessionSnapshot {
            state: CoordinatorState::Paused,
            stats,
            stop_reason: None,
        });
        drop(ctl);
        info!("session paused");
        Ok(())
    }

    /// Resume a paused session; the next tick lands at `now + remaining`,
    /// where `remaining` was frozen at pause time.
    pub fn resume(&self) -> Result<()> {
        let mut ctl = self.ctx.control.lock().unwrap();
        if !self
            .ctx
            .state
            .transition(&[CoordinatorState::Paused], CoordinatorState::Running)
        {
            return Err(ClickError::invalid_transition(
                self.state().to_string(),
                "resume",
            ));
        }
        if let Some(paused_at) = ctl.pause_started.take() {
            let span = paused_at.elapsed();
            self.ctx
                .paused_micros
                .fetch_add(span.as_micros() as u64, Ordering::AcqRel);
        }
        if let Some(timer) = &ctl.timer {
            timer.resume();
        }

        let stats = self.ctx.snapshot_tx.borrow().stats;
        self.ctx.snapshot_tx.send_replace(SessionSnapshot {
            state: CoordinatorState::Running,
            stats,
            stop_reason: None,
        });
        drop(ctl);
        info!("session resumed");
        Ok(())
    }

    /// Manual stop. Non-blocking and idempotent; a running session unwinds in
    /// the tick task, a deferred start unwinds immediately.
    pub fn stop(&self) {
        self.ctx.cancel.store(true, Ordering::Release);
        self.ctx.cancel_wake.notify_waiters();
        self.release_deferred(StopReason::Manual);
    }

    /// Out-of-band stop for hotkey/panic paths. Identical to `stop` except it
    /// also raises the emergency side-channel. Never takes the control lock,
    /// so it is safe from any thread while a tick is in flight.
    pub fn emergency_stop(&self) {
        self.ctx.emergency.store(true, Ordering::Release);
        self.ctx.cancel.store(true, Ordering::Release);
        self.ctx.cancel_wake.notify_waiters();
        self.emergency_tx.send_replace(true);
        self.release_deferred(StopReason::Emergency);
    }

    /// Whether a stop has been requested for the current session. Checked by
    /// the scheduler's countdown loop.
    pub(crate) fn cancel_requested(&self) -> bool {
        self.ctx.cancel.load(Ordering::Acquire)
    }

    /// Claim the coordinator for a deferred start (`Scheduled` or
    /// `Countdown`).
    pub(crate) fn mark_deferred(&self, state: CoordinatorState) -> Result<()> {
        let _ctl = self.ctx.control.lock().unwrap();
        if !self
            .ctx
            .state
            .transition(&[CoordinatorState::Idle], state)
        {
            return Err(ClickError::invalid_transition(
                self.state().to_string(),
                "schedule",
            ));
        }
        self.ctx.cancel.store(false, Ordering::Release);
        self.ctx.emergency.store(false, Ordering::Release);
        self.ctx.snapshot_tx.send_replace(SessionSnapshot {
            state,
            stats: StatsSnapshot::default(),
            stop_reason: None,
        });
        Ok(())
    }

    /// Unwind a deferred start that was cancelled before it fired.
    fn release_deferred(&self, reason: StopReason) {
        if self.ctx.state.transition(
            &[CoordinatorState::Scheduled, CoordinatorState::Countdown],
            CoordinatorState::Idle,
        ) {
            let stats = self.ctx.snapshot_tx.borrow().stats;
            self.ctx.snapshot_tx.send_replace(SessionSnapshot {
                state: CoordinatorState::Stopped,
                stats,
                stop_reason: Some(reason),
            });
            info!("deferred start cancelled");
        }
    }

    pub(crate) fn release_deferred_for_cancel(&self) {
        self.release_deferred(StopReason::Manual);
    }
}

impl SessionCtx {
    fn stop_reason(&self) -> StopReason {
        if self.emergency.load(Ordering::Acquire) {
            StopReason::Emergency
        } else {
            StopReason::Manual
        }
    }

    fn publish_running(&self, stats: &StatisticsTracker) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            state: self.state.load(),
            stats: stats.snapshot(),
            stop_reason: None,
        });
    }
}

/// The tick task: one per session, sole mutator of session statistics.
async fn run_session(
    ctx: SessionCtx,
    config: ClickConfiguration,
    timer: TimerHandle,
    mut ticks: mpsc::Receiver<TimingSample>,
    mut rng: StdRng,
) {
    let started = Instant::now();
    let mut stats = StatisticsTracker::new();

    let reason = loop {
        // Checked before parking in select as well as per tick:
        // `notify_waiters` does not store a permit, so a cancellation raised
        // while the previous tick was being processed must be caught here.
        if ctx.cancel.load(Ordering::Acquire) {
            break ctx.stop_reason();
        }

        let sample = tokio::select! {
            next = ticks.recv() => match next {
                Some(sample) => sample,
                None => break ctx.stop_reason(),
            },
            _ = ctx.cancel_wake.notified() => {
                if ctx.cancel.load(Ordering::Acquire) {
                    break ctx.stop_reason();
                }
                continue;
            }
        };

        // Cancellation flag first; a set flag means no further injection.
        if ctx.cancel.load(Ordering::Acquire) {
            break ctx.stop_reason();
        }

        if sample.anomaly {
            stats.record_anomaly();
        }

        let point = jitter::jitter_location(
            &mut rng,
            config.target_point,
            config.location_jitter_radius_px,
            config.display_bounds,
        );
        if config.interval_jitter_ratio > 0.0 {
            timer.set_interval(jitter::jitter_interval(
                &mut rng,
                config.base_interval(),
                config.interval_jitter_ratio,
            ));
        }

        // The injector may block; spawn_blocking plus a timeout keeps the
        // tick task's suspension bounded. A timeout is an injection failure.
        let injector = Arc::clone(&ctx.injector);
        let click_type = config.click_type;
        let invoked = Instant::now();
        let outcome = tokio::time::timeout(
            ctx.injection_timeout,
            tokio::task::spawn_blocking(move || injector.inject(point, click_type)),
        )
        .await;
        let execution_time = invoked.elapsed();

        let failure = match outcome {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e.to_string()),
            Ok(Err(join_err)) => Some(format!("injection task panicked: {join_err}")),
            Err(_) => Some(format!(
                "injection timed out after {:?}",
                ctx.injection_timeout
            )),
        };

        match &failure {
            None => stats.record_success(execution_time),
            Some(why) => {
                warn!(reason = %why, "click injection failed");
                stats.record_failure(execution_time);
            }
        }

        let active = active_elapsed(&ctx, started);
        stats.set_elapsed_active(active);
        ctx.publish_running(&stats);

        if let Some(why) = failure {
            if config.stop_on_error {
                break StopReason::InjectionError(why);
            }
        }

        match config.duration_policy {
            DurationPolicy::Unlimited => {}
            DurationPolicy::ClickCount { count } => {
                if stats.attempts() >= count {
                    break StopReason::PolicySatisfied;
                }
            }
            DurationPolicy::TimeLimit { seconds } => {
                if active >= Duration::from_secs(seconds) {
                    break StopReason::PolicySatisfied;
                }
            }
        }
    };

    timer.stop();

    {
        let mut ctl = ctx.control.lock().unwrap();
        ctl.timer = None;
        let pending_pause = ctl
            .pause_started
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let active = active_elapsed(&ctx, started).saturating_sub(pending_pause);
        stats.set_elapsed_active(active);

        // Terminal snapshot and state change under the control lock: a
        // pause or resume racing session completion either lands before this
        // block or fails its transition afterwards, so nothing is ever
        // published after the terminal snapshot.
        ctx.snapshot_tx.send_replace(SessionSnapshot {
            state: CoordinatorState::Stopped,
            stats: stats.snapshot(),
            stop_reason: Some(reason.clone()),
        });
        ctx.state.store(CoordinatorState::Idle);
    }
    info!(?reason, attempts = stats.attempts(), "session stopped");
}

fn active_elapsed(ctx: &SessionCtx, started: Instant) -> Duration {
    let paused = Duration::from_micros(ctx.paused_micros.load(Ordering::Acquire));
    started.elapsed().saturating_sub(paused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClickType, Point};
    use crate::injector::InjectionError;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;
    use std::time::Instant as StdInstant;

    /// Injector whose per-attempt outcomes are scripted up front; once the
    /// script runs out every attempt succeeds.
    struct ScriptedInjector {
        script: Mutex<VecDeque<std::result::Result<(), InjectionError>>>,
        attempts: AtomicU64,
        latency: Duration,
    }

    impl ScriptedInjector {
        fn ok() -> Self {
            Self::with_script(vec![])
        }

        fn with_script(script: Vec<std::result::Result<(), InjectionError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                attempts: AtomicU64::new(0),
                latency: Duration::ZERO,
            }
        }

        fn slow(latency: Duration) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                attempts: AtomicU64::new(0),
                latency,
            }
        }

        fn attempts(&self) -> u64 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl ClickInjector for ScriptedInjector {
        fn inject(
            &self,
            _point: Point,
            _click_type: ClickType,
        ) -> std::result::Result<(), InjectionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                std::thread::sleep(self.latency);
            }
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn config(interval_ms: u64) -> ClickConfiguration {
        ClickConfiguration::new(Point::new(500.0, 500.0), interval_ms)
    }

    async fn wait_until_idle(coordinator: &ClickCoordinator) -> SessionSnapshot {
        let deadline = StdInstant::now() + Duration::from_secs(5);
        loop {
            let snapshot = coordinator.snapshot();
            if coordinator.state() == CoordinatorState::Idle && snapshot.stop_reason.is_some() {
                return snapshot;
            }
            assert!(StdInstant::now() < deadline, "session did not stop in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_invalid_config_never_starts_a_session() {
        let coordinator = ClickCoordinator::new(Arc::new(ScriptedInjector::ok()));
        let result = coordinator.start(config(0));
        assert_matches!(result, Err(ClickError::InvalidInterval { ms: 0 }));
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let coordinator = ClickCoordinator::new(Arc::new(ScriptedInjector::ok()));
        coordinator.start(config(20)).unwrap();
        assert_matches!(
            coordinator.start(config(20)),
            Err(ClickError::InvalidTransition { .. })
        );
        coordinator.stop();
        wait_until_idle(&coordinator).await;
    }

    #[tokio::test]
    async fn test_click_count_policy_performs_exact_attempts() {
        let injector = Arc::new(ScriptedInjector::with_script(vec![
            Ok(()),
            Err(InjectionError::new("miss")),
            Ok(()),
            Err(InjectionError::new("miss")),
            Ok(()),
        ]));
        let mut cfg = config(10);
        cfg.duration_policy = DurationPolicy::ClickCount { count: 5 };

        let coordinator = ClickCoordinator::new(Arc::clone(&injector) as Arc<dyn ClickInjector>);
        coordinator.start(cfg).unwrap();

        let snapshot = wait_until_idle(&coordinator).await;
        assert_eq!(injector.attempts(), 5);
        assert_eq!(snapshot.stats.attempts, 5);
        assert_eq!(snapshot.stats.successes, 3);
        assert_eq!(snapshot.stats.failures, 2);
        assert_eq!(snapshot.stop_reason, Some(StopReason::PolicySatisfied));
    }

    #[tokio::test]
    async fn test_stop_on_error_halts_at_first_failure() {
        let injector = Arc::new(ScriptedInjector::with_script(vec![
            Ok(()),
            Ok(()),
            Err(InjectionError::new("window gone")),
        ]));
        let mut cfg = config(10);
        cfg.duration_policy = DurationPolicy::ClickCount { count: 5 };
        cfg.stop_on_error = true;

        let coordinator = ClickCoordinator::new(Arc::clone(&injector) as Arc<dyn ClickInjector>);
        coordinator.start(cfg).unwrap();

        let snapshot = wait_until_idle(&coordinator).await;
        assert_eq!(injector.attempts(), 3);
        assert_matches!(
            snapshot.stop_reason,
            Some(StopReason::InjectionError(ref why)) if why.contains("window gone")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_emergency_stop_returns_promptly_despite_slow_injector() {
        let injector = Arc::new(ScriptedInjector::slow(Duration::from_millis(100)));
        let coordinator = ClickCoordinator::new(injector as Arc<dyn ClickInjector>)
            .with_injection_timeout(Duration::from_millis(500));
        coordinator.start(config(10)).unwrap();

        // Let a tick get in flight.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let called = StdInstant::now();
        coordinator.emergency_stop();
        assert!(called.elapsed() < Duration::from_millis(5));

        let snapshot = wait_until_idle(&coordinator).await;
        assert_eq!(snapshot.stop_reason, Some(StopReason::Emergency));
        assert!(*coordinator.emergency_signal().borrow());
    }

    #[tokio::test]
    async fn test_emergency_stop_is_idempotent() {
        let coordinator = ClickCoordinator::new(Arc::new(ScriptedInjector::ok()));
        coordinator.start(config(20)).unwrap();
        coordinator.emergency_stop();
        coordinator.emergency_stop();
        let snapshot = wait_until_idle(&coordinator).await;
        assert_eq!(snapshot.stop_reason, Some(StopReason::Emergency));
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_pause() {
        let injector = Arc::new(ScriptedInjector::ok());
        let coordinator = ClickCoordinator::new(Arc::clone(&injector) as Arc<dyn ClickInjector>);
        coordinator.start(config(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(90)).await;
        coordinator.pause().unwrap();
        // One tick may already be buffered at pause time; let it drain before
        // sampling the counter.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let before = coordinator.snapshot().stats.attempts;
        assert!(before > 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.snapshot().stats.attempts, before);
        assert_eq!(coordinator.state(), CoordinatorState::Paused);

        coordinator.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(90)).await;
        coordinator.stop();
        let snapshot = wait_until_idle(&coordinator).await;
        assert!(snapshot.stats.attempts > before);
    }

    #[tokio::test]
    async fn test_pause_racing_completion_never_outlives_final_snapshot() {
        // Hammer pause/resume while a short session finishes on its own; the
        // terminal snapshot must be the last one published.
        for _ in 0..20 {
            let coordinator =
                Arc::new(ClickCoordinator::new(Arc::new(ScriptedInjector::ok())));
            let mut cfg = config(5);
            cfg.duration_policy = DurationPolicy::ClickCount { count: 3 };
            coordinator.start(cfg).unwrap();

            let pauser = Arc::clone(&coordinator);
            let racer = tokio::spawn(async move {
                while pauser.state() != CoordinatorState::Idle {
                    if pauser.pause().is_ok() {
                        let _ = pauser.resume();
                    }
                    tokio::task::yield_now().await;
                }
            });

            let snapshot = wait_until_idle(&coordinator).await;
            racer.await.unwrap();
            assert_eq!(snapshot.stop_reason, Some(StopReason::PolicySatisfied));
            assert_eq!(coordinator.snapshot().state, CoordinatorState::Stopped);
        }
    }

    #[tokio::test]
    async fn test_pause_requires_running() {
        let coordinator = ClickCoordinator::new(Arc::new(ScriptedInjector::ok()));
        assert_matches!(
            coordinator.pause(),
            Err(ClickError::InvalidTransition { .. })
        );
        assert_matches!(
            coordinator.resume(),
            Err(ClickError::InvalidTransition { .. })
        );
    }

    #[tokio::test]
    async fn test_injection_timeout_counts_as_failure() {
        let injector = Arc::new(ScriptedInjector::slow(Duration::from_millis(80)));
        let mut cfg = config(10);
        cfg.duration_policy = DurationPolicy::ClickCount { count: 2 };

        let coordinator = ClickCoordinator::new(injector as Arc<dyn ClickInjector>)
            .with_injection_timeout(Duration::from_millis(10));
        coordinator.start(cfg).unwrap();

        let snapshot = wait_until_idle(&coordinator).await;
        assert_eq!(snapshot.stats.attempts, 2);
        assert_eq!(snapshot.stats.failures, 2);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_counters() {
        let injector = Arc::new(ScriptedInjector::ok());
        let mut cfg = config(10);
        cfg.duration_policy = DurationPolicy::ClickCount { count: 3 };

        let coordinator = ClickCoordinator::new(Arc::clone(&injector) as Arc<dyn ClickInjector>);
        coordinator.start(cfg.clone()).unwrap();
        let first = wait_until_idle(&coordinator).await;
        assert_eq!(first.stats.attempts, 3);

        coordinator.start(cfg).unwrap();
        let second = wait_until_idle(&coordinator).await;
        assert_eq!(second.stats.attempts, 3);
        assert_eq!(injector.attempts(), 6);
    }
}
