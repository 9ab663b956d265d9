//! Idle-pause: hold the countdown while someone is using the kiosk

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, Duration, Instant},
};
use tracing::{debug, info};

/// Minimum spacing between idle notifications
pub const IDLE_THROTTLE: Duration = Duration::from_millis(500);
/// Silence after which the countdown resumes
pub const IDLE_RESUME_AFTER: Duration = Duration::from_secs(5);

/// Kind of page activity reported by the indicator script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Pointer,
    Keyboard,
    Scroll,
    Touch,
}

/// One page-activity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    pub kind: ActivityKind,
    /// Events raised on the indicator itself never count as activity
    #[serde(default)]
    pub from_indicator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleSignal {
    Pause,
    Resume,
}

#[derive(Debug, Default)]
struct IdleInner {
    enabled: bool,
    is_idle_paused: bool,
    last_activity_at: Option<Instant>,
    last_notified_at: Option<Instant>,
    generation: u64,
    inactivity_timer: Option<JoinHandle<()>>,
}

impl IdleInner {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.inactivity_timer.take() {
            timer.abort();
        }
    }
}

/// Watches page activity and emits pause/resume signals.
///
/// State here is ephemeral and never touches the persisted status; losing it
/// on restart only means a missed idle-pause.
pub struct IdleMonitor {
    inner: Arc<Mutex<IdleInner>>,
    signals: mpsc::UnboundedSender<IdleSignal>,
}

impl IdleMonitor {
    /// Create a monitor and the receiving end of its signals
    pub fn new() -> (Self, mpsc::UnboundedReceiver<IdleSignal>) {
        let (signals, rx) = mpsc::unbounded_channel();
        let monitor = Self {
            inner: Arc::new(Mutex::new(IdleInner::default())),
            signals,
        };
        (monitor, rx)
    }

    fn lock(&self) -> MutexGuard<'_, IdleInner> {
        lock_inner(&self.inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn is_idle_paused(&self) -> bool {
        self.lock().is_idle_paused
    }

    pub fn last_activity_at(&self) -> Option<Instant> {
        self.lock().last_activity_at
    }

    /// Turn monitoring on or off. Disabling drops any idle-pause and the
    /// pending inactivity timer; returns whether an idle-pause was dropped.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let mut inner = self.lock();
        inner.enabled = enabled;
        if enabled {
            return false;
        }
        inner.cancel_timer();
        std::mem::take(&mut inner.is_idle_paused)
    }

    /// Forget any idle-pause without emitting a signal
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.cancel_timer();
        inner.is_idle_paused = false;
    }

    /// Feed one activity signal. Returns whether it started an idle-pause.
    pub fn record_activity(&self, report: &ActivityReport) -> bool {
        let mut inner = self.lock();
        if !inner.enabled || report.from_indicator {
            return false;
        }

        let now = Instant::now();
        inner.last_activity_at = Some(now);

        let throttled = inner
            .last_notified_at
            .is_some_and(|at| now.duration_since(at) < IDLE_THROTTLE);
        let paused = !inner.is_idle_paused && !throttled;
        if paused {
            inner.is_idle_paused = true;
            inner.last_notified_at = Some(now);
            info!("User activity detected, pausing countdown");
            let _ = self.signals.send(IdleSignal::Pause);
        }

        inner.cancel_timer();
        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let signals = self.signals.clone();
        inner.inactivity_timer = Some(tokio::spawn(async move {
            sleep(IDLE_RESUME_AFTER).await;
            let mut inner = lock_inner(&shared);
            if inner.generation != generation || !inner.is_idle_paused {
                return;
            }
            inner.is_idle_paused = false;
            inner.last_notified_at = Some(Instant::now());
            inner.inactivity_timer = None;
            debug!("No activity for {:?}, resuming countdown", IDLE_RESUME_AFTER);
            let _ = signals.send(IdleSignal::Resume);
        }));

        paused
    }
}

fn lock_inner(inner: &Mutex<IdleInner>) -> MutexGuard<'_, IdleInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn pointer() -> ActivityReport {
        ActivityReport { kind: ActivityKind::Pointer, from_indicator: false }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<IdleSignal>) -> Vec<IdleSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    /// Let spawned timers observe the advanced clock
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_pauses_once_and_silence_resumes_once() {
        let (monitor, mut rx) = IdleMonitor::new();
        monitor.set_enabled(true);

        assert!(monitor.record_activity(&pointer()));
        for _ in 0..10 {
            advance(Duration::from_millis(50)).await;
            assert!(!monitor.record_activity(&pointer()));
        }
        assert_eq!(drain(&mut rx), vec![IdleSignal::Pause]);

        advance(Duration::from_millis(4_900)).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());
        assert!(monitor.is_idle_paused());

        advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![IdleSignal::Resume]);
        assert!(!monitor.is_idle_paused());

        advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_events_and_disabled_monitor_are_ignored() {
        let (monitor, mut rx) = IdleMonitor::new();
        assert!(!monitor.record_activity(&pointer()));

        monitor.set_enabled(true);
        let own = ActivityReport { kind: ActivityKind::Touch, from_indicator: true };
        assert!(!monitor.record_activity(&own));
        assert!(drain(&mut rx).is_empty());
        assert!(monitor.last_activity_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_clears_pause_and_timer() {
        let (monitor, mut rx) = IdleMonitor::new();
        monitor.set_enabled(true);
        monitor.record_activity(&pointer());
        drain(&mut rx);

        assert!(monitor.set_enabled(false));
        assert!(!monitor.is_idle_paused());

        advance(IDLE_RESUME_AFTER * 2).await;
        settle().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_right_after_resume_is_throttled() {
        let (monitor, mut rx) = IdleMonitor::new();
        monitor.set_enabled(true);
        monitor.record_activity(&pointer());
        advance(IDLE_RESUME_AFTER + Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![IdleSignal::Pause, IdleSignal::Resume]);

        // the resume notification itself opens a throttle window
        assert!(!monitor.record_activity(&pointer()));
        advance(IDLE_THROTTLE).await;
        assert!(monitor.record_activity(&pointer()));
    }
}
