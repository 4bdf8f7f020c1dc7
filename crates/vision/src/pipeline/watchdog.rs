//! Watchdog responsible for detecting stalled pipeline stages.
//!
//! The watchdog tracks heartbeats emitted by the capture, vision, and logging
//! stages. When capture or vision stops beating, the shared cancel token is
//! fired so the control loop parks the motors and the binary shuts down. A
//! quiet logger is only reported: frame logging is best effort.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use handoff::{CancelToken, Worker, WorkerError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Sleep interval between watchdog health checks.
pub const WATCHDOG_POLL_INTERVAL_MS: u64 = 500;
/// Time without a heartbeat before a component is considered stalled.
pub const WATCHDOG_STALE_THRESHOLD_MS: u64 = 1_500;
/// Grace period at startup allowing components to warm up before monitoring.
pub const WATCHDOG_STARTUP_GRACE_MS: u64 = 5_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Logical components monitored by the watchdog.
pub enum HealthComponent {
    Capture,
    Vision,
    Logger,
}

impl HealthComponent {
    /// Human readable label used in log messages.
    pub fn label(self) -> &'static str {
        match self {
            HealthComponent::Capture => "capture",
            HealthComponent::Vision => "vision",
            HealthComponent::Logger => "logger",
        }
    }
}

#[derive(Debug)]
pub struct PipelineHealth {
    capture: AtomicU64,
    vision: AtomicU64,
    logger: AtomicU64,
    logger_enabled: AtomicBool,
    stale_after_ms: u64,
}

impl PipelineHealth {
    /// Initialise the health tracker with the startup grace period.
    pub fn new() -> Self {
        Self::with_timing(WATCHDOG_STARTUP_GRACE_MS, WATCHDOG_STALE_THRESHOLD_MS)
    }

    pub fn with_timing(grace_ms: u64, stale_after_ms: u64) -> Self {
        let grace_deadline = current_millis().saturating_add(grace_ms);
        Self {
            capture: AtomicU64::new(grace_deadline),
            vision: AtomicU64::new(grace_deadline),
            logger: AtomicU64::new(grace_deadline),
            logger_enabled: AtomicBool::new(false),
            stale_after_ms,
        }
    }

    /// Report a quiet logger. It never stops the run.
    pub fn monitor_logger(&self, enabled: bool) {
        self.logger_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Register a heartbeat for the supplied component.
    pub fn beat(&self, component: HealthComponent) {
        self.beat_at(component, current_millis());
    }

    fn beat_at(&self, component: HealthComponent, millis: u64) {
        self.slot(component).store(millis, Ordering::Relaxed);
    }

    fn slot(&self, component: HealthComponent) -> &AtomicU64 {
        match component {
            HealthComponent::Capture => &self.capture,
            HealthComponent::Vision => &self.vision,
            HealthComponent::Logger => &self.logger,
        }
    }

    fn is_stale(&self, component: HealthComponent, now: u64) -> bool {
        now.saturating_sub(self.slot(component).load(Ordering::Relaxed)) > self.stale_after_ms
    }

    /// Returns the first stage the vehicle depends on that has not produced a
    /// heartbeat recently. The logger is never reported here.
    pub fn stale_component(&self, now: u64) -> Option<HealthComponent> {
        [HealthComponent::Capture, HealthComponent::Vision]
            .into_iter()
            .find(|&c| self.is_stale(c, now))
    }

    /// `true` when logging is monitored and the logger has gone quiet.
    pub fn logger_lagging(&self, now: u64) -> bool {
        self.logger_enabled.load(Ordering::Relaxed) && self.is_stale(HealthComponent::Logger, now)
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared record of why the watchdog fired.
#[derive(Debug, Default)]
pub struct WatchdogState {
    triggered: AtomicBool,
    reason: Mutex<Option<HealthComponent>>,
}

impl WatchdogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger reason and mark the watchdog as fired.
    pub fn arm(&self, component: HealthComponent) {
        *self.reason.lock() = Some(component);
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Component that caused the trigger, if any.
    pub fn reason(&self) -> Option<HealthComponent> {
        *self.reason.lock()
    }
}

/// Spawn the watchdog thread. It exits when `cancel` fires, after firing it
/// itself on a capture or vision stall. A lagging logger gets one warning per
/// quiet spell.
pub fn spawn_watchdog(
    health: Arc<PipelineHealth>,
    cancel: CancelToken,
    state: Arc<WatchdogState>,
    poll: Duration,
) -> Result<Worker, WorkerError> {
    Worker::spawn("rover-watchdog", move || {
        debug!("watchdog armed");
        let mut logger_quiet = false;
        while !cancel.is_cancelled() {
            thread::sleep(poll);
            let now = current_millis();
            match (health.logger_lagging(now), logger_quiet) {
                (true, false) => {
                    warn!("frame logger has stalled; dropping log samples until it catches up");
                    logger_quiet = true;
                }
                (false, true) => {
                    info!("frame logger caught up");
                    logger_quiet = false;
                }
                _ => {}
            }
            if let Some(component) = health.stale_component(now) {
                error!(
                    "Watchdog detected stalled {} stage; stopping the vehicle",
                    component.label()
                );
                state.arm(component);
                cancel.cancel();
                break;
            }
        }
    })
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_components_are_healthy_during_grace() {
        let health = PipelineHealth::new();
        assert_eq!(health.stale_component(current_millis()), None);
    }

    #[test]
    fn silent_component_is_reported_in_order() {
        let health = PipelineHealth::with_timing(0, 100);
        let later = current_millis() + 1_000;
        assert_eq!(health.stale_component(later), Some(HealthComponent::Capture));
        health.beat(HealthComponent::Capture);
        let soon = current_millis() + 50;
        assert_eq!(health.stale_component(soon), None);
    }

    #[test]
    fn quiet_logger_is_reported_but_never_stale() {
        let health = PipelineHealth::with_timing(0, 100);
        let far = current_millis() + 60_000;
        health.beat_at(HealthComponent::Capture, far);
        health.beat_at(HealthComponent::Vision, far);
        assert!(!health.logger_lagging(far + 50));
        health.monitor_logger(true);
        assert!(health.logger_lagging(far + 50));
        assert_eq!(health.stale_component(far + 50), None);
        health.beat_at(HealthComponent::Logger, far);
        assert!(!health.logger_lagging(far + 50));
    }

    #[test]
    fn blocked_logger_does_not_stop_the_run() {
        let health = Arc::new(PipelineHealth::with_timing(0, 20));
        health.monitor_logger(true);
        let far = current_millis() + 60_000;
        health.beat_at(HealthComponent::Capture, far);
        health.beat_at(HealthComponent::Vision, far);
        let cancel = CancelToken::new();
        let state = Arc::new(WatchdogState::new());
        let worker = spawn_watchdog(
            health.clone(),
            cancel.clone(),
            state.clone(),
            Duration::from_millis(5),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(health.logger_lagging(current_millis()));
        assert!(!cancel.is_cancelled());
        assert!(!state.is_triggered());

        cancel.cancel();
        worker.join().unwrap();
        assert_eq!(state.reason(), None);
    }

    #[test]
    fn watchdog_cancels_on_stall() {
        let health = Arc::new(PipelineHealth::with_timing(0, 20));
        let cancel = CancelToken::new();
        let state = Arc::new(WatchdogState::new());
        let worker = spawn_watchdog(
            health,
            cancel.clone(),
            state.clone(),
            Duration::from_millis(10),
        )
        .unwrap();
        worker.join().unwrap();
        assert!(cancel.is_cancelled());
        assert!(state.is_triggered());
        assert_eq!(state.reason(), Some(HealthComponent::Capture));
    }

    #[test]
    fn watchdog_exits_when_cancelled() {
        let health = Arc::new(PipelineHealth::new());
        let cancel = CancelToken::new();
        let state = Arc::new(WatchdogState::new());
        let worker = spawn_watchdog(
            health,
            cancel.clone(),
            state.clone(),
            Duration::from_millis(5),
        )
        .unwrap();
        cancel.cancel();
        worker.join().unwrap();
        assert!(!state.is_triggered());
    }
}
