//! Rotation timer and countdown ticker on durable alarms

use std::sync::{Arc, Mutex, PoisonError};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::overlay::OverlayBridge;
use crate::{
    host::{ActionHost, AlarmHost, AlarmSpec},
    state::AppState,
};

/// Fires once at the end of a dwell
pub const ROTATION_ALARM: &str = "TAB_ROTATION_ALARM";
/// Fires every second while a dwell is counting down
pub const COUNTDOWN_ALARM: &str = "COUNTDOWN_ALARM";
pub const COUNTDOWN_PERIOD_MS: u64 = 1000;

/// Whole seconds left until `end`, rounded up, never negative
pub fn remaining_secs(end: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (end - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    }
}

/// Turns a dwell into a rotation alarm plus a countdown ticker.
///
/// The countdown is always re-derived from `rotationEndTime`, never
/// decremented in memory, so it stays correct across a suspend.
pub struct Scheduler {
    alarms: Arc<dyn AlarmHost>,
    action: Arc<dyn ActionHost>,
    overlay: Arc<OverlayBridge>,
    /// Dwell left when the countdown was idle-suspended
    suspended: Mutex<Option<u64>>,
    /// Serializes alarm changes so a cancel never interleaves with an arm
    ops: AsyncMutex<()>,
}

impl Scheduler {
    pub fn new(alarms: Arc<dyn AlarmHost>, action: Arc<dyn ActionHost>, overlay: Arc<OverlayBridge>) -> Self {
        Self {
            alarms,
            action,
            overlay,
            suspended: Mutex::new(None),
            ops: AsyncMutex::new(()),
        }
    }

    fn suspended_slot(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        self.suspended.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_slot().is_some()
    }

    async fn clear_alarms(&self) {
        for name in [ROTATION_ALARM, COUNTDOWN_ALARM] {
            if let Err(e) = self.alarms.clear(name).await {
                warn!("Failed to clear alarm {}: {}", name, e);
            }
        }
    }

    /// Replace any pending timer with one that rotates after `seconds`.
    /// Returns false, leaving no timer behind, when the rotation is no
    /// longer running.
    ///
    /// While idle-suspended only the deadline is recorded; the alarms are
    /// created on resume.
    pub async fn arm(&self, state: &AppState, seconds: u64) -> bool {
        let _ops = self.ops.lock().await;
        self.arm_locked(state, seconds).await
    }

    async fn arm_locked(&self, state: &AppState, seconds: u64) -> bool {
        self.clear_alarms().await;

        let now = Utc::now();
        let end = now + Duration::seconds(seconds as i64);
        // status and deadline change together under the state lock
        let running = state.update(|s| {
            let running = s.status.is_running();
            s.rotation_end_time = running.then_some(end);
            running
        });
        if !running {
            debug!("Rotation left running before arming, no timer set");
            return false;
        }

        {
            let mut suspended = self.suspended_slot();
            if suspended.is_some() {
                *suspended = Some(seconds);
                debug!("Countdown idle-suspended, holding {}s dwell", seconds);
                return true;
            }
        }

        let rotation = AlarmSpec { when: end, period_ms: None };
        if let Err(e) = self.alarms.create(ROTATION_ALARM, rotation).await {
            warn!("Error scheduling rotation: {}", e);
        }
        let ticker = AlarmSpec {
            when: now + Duration::milliseconds(COUNTDOWN_PERIOD_MS as i64),
            period_ms: Some(COUNTDOWN_PERIOD_MS),
        };
        if let Err(e) = self.alarms.create(COUNTDOWN_ALARM, ticker).await {
            warn!("Error scheduling countdown: {}", e);
        }
        debug!("Next rotation in {}s", seconds);

        self.overlay.push_countdown(seconds, &state.snapshot()).await;
        true
    }

    /// Tear down both alarms, any idle suspension and the badge
    pub async fn cancel(&self, state: &AppState) {
        let _ops = self.ops.lock().await;
        self.clear_alarms().await;
        self.suspended_slot().take();
        state.update(|s| s.rotation_end_time = None);
        if let Err(e) = self.action.set_badge("", None).await {
            warn!("Failed to clear badge: {}", e);
        }
    }

    /// One countdown tick. Stops the ticker once the dwell is over or the
    /// rotation is no longer running.
    pub async fn tick(&self, state: &AppState) -> Option<u64> {
        let _ops = self.ops.lock().await;
        let snapshot = state.snapshot();
        let end = match snapshot.rotation_end_time {
            Some(end) if snapshot.status.is_running() => end,
            _ => {
                self.stop_ticker().await;
                return None;
            }
        };

        let remaining = remaining_secs(end, Utc::now());
        self.overlay.push_countdown(remaining, &snapshot).await;
        if remaining == 0 {
            self.stop_ticker().await;
        }
        Some(remaining)
    }

    async fn stop_ticker(&self) {
        if let Err(e) = self.alarms.clear(COUNTDOWN_ALARM).await {
            warn!("Failed to clear countdown alarm: {}", e);
        }
    }

    /// Freeze the countdown without touching the rotation status.
    /// Returns false when already suspended or nothing is counting down.
    pub async fn suspend(&self, state: &AppState) -> bool {
        let _ops = self.ops.lock().await;
        let Some(end) = state.read(|s| s.rotation_end_time.filter(|_| s.status.is_running())) else {
            return false;
        };
        let remaining = remaining_secs(end, Utc::now()).max(1);
        {
            let mut suspended = self.suspended_slot();
            if suspended.is_some() {
                return false;
            }
            *suspended = Some(remaining);
        }
        self.clear_alarms().await;
        info!("Countdown suspended with {}s left", remaining);
        true
    }

    /// Restart a suspended countdown from where it stopped
    pub async fn resume(&self, state: &AppState) -> bool {
        let _ops = self.ops.lock().await;
        let Some(remaining) = self.suspended_slot().take() else {
            return false;
        };
        if !state.read(|s| s.status.is_running()) {
            return false;
        }
        info!("Countdown resumed with {}s left", remaining);
        self.arm_locked(state, remaining).await
    }

    /// Re-arm a running rotation whose alarm went missing, e.g. after the
    /// host restarted the process. A dwell that already ran out restarts
    /// with the default interval.
    pub async fn recover(&self, state: &AppState) -> bool {
        let _ops = self.ops.lock().await;
        let snapshot = state.snapshot();
        if !snapshot.status.is_running() {
            return false;
        }
        match self.alarms.get(ROTATION_ALARM).await {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(e) => {
                warn!("Could not inspect rotation alarm: {}", e);
                return false;
            }
        }
        let seconds = snapshot
            .rotation_end_time
            .map(|end| remaining_secs(end, Utc::now()))
            .filter(|&secs| secs > 0)
            .unwrap_or(snapshot.global_config.default_interval);
        info!("Rotation alarm missing, re-arming for {}s", seconds);
        self.arm_locked(state, seconds).await
    }

    pub async fn pending(&self) -> Option<AlarmSpec> {
        self.alarms.get(ROTATION_ALARM).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host::{LocalAlarms, LocalBrowser},
        state::Status,
    };

    fn scheduler() -> (Scheduler, Arc<LocalAlarms>) {
        let browser = Arc::new(LocalBrowser::new());
        let alarms = Arc::new(LocalAlarms::new());
        let overlay = Arc::new(OverlayBridge::new(browser.clone(), browser.clone()));
        (Scheduler::new(alarms.clone(), browser, overlay), alarms)
    }

    fn running() -> AppState {
        let state = AppState::new();
        state.update(|s| s.status = Status::Running);
        state
    }

    #[test]
    fn remaining_rounds_up_and_floors_at_zero() {
        let now = Utc::now();
        assert_eq!(remaining_secs(now + Duration::milliseconds(9_001), now), 10);
        assert_eq!(remaining_secs(now + Duration::seconds(10), now), 10);
        assert_eq!(remaining_secs(now + Duration::milliseconds(1), now), 1);
        assert_eq!(remaining_secs(now - Duration::seconds(3), now), 0);
    }

    #[tokio::test]
    async fn arm_reports_full_dwell_and_creates_both_alarms() {
        let (scheduler, alarms) = scheduler();
        let state = running();

        scheduler.arm(&state, 10).await;
        assert_eq!(alarms.len(), 2);
        assert_eq!(scheduler.tick(&state).await, Some(10));

        let end = state.snapshot().rotation_end_time.unwrap();
        let fired = alarms.take_due(end).await;
        assert!(fired.contains(&ROTATION_ALARM.to_string()));
        assert!(alarms.take_due(end).await.iter().all(|n| n != ROTATION_ALARM));
    }

    #[tokio::test]
    async fn rearming_replaces_the_previous_timer() {
        let (scheduler, alarms) = scheduler();
        let state = running();

        scheduler.arm(&state, 60).await;
        scheduler.arm(&state, 5).await;
        let pending = scheduler.pending().await.unwrap();
        assert_eq!(Some(pending.when), state.snapshot().rotation_end_time);
        assert_eq!(alarms.len(), 2);
    }

    #[tokio::test]
    async fn cancel_tears_everything_down() {
        let (scheduler, alarms) = scheduler();
        let state = running();
        scheduler.arm(&state, 10).await;

        scheduler.cancel(&state).await;
        assert!(alarms.is_empty());
        assert!(state.snapshot().rotation_end_time.is_none());
    }

    #[tokio::test]
    async fn ticker_stops_when_not_running() {
        let (scheduler, alarms) = scheduler();
        let state = running();
        scheduler.arm(&state, 10).await;
        state.update(|s| s.status = Status::Paused);

        assert_eq!(scheduler.tick(&state).await, None);
        assert!(alarms.get(COUNTDOWN_ALARM).await.unwrap().is_none());
        assert!(alarms.get(ROTATION_ALARM).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn suspend_holds_dwell_until_resume() {
        let (scheduler, alarms) = scheduler();
        let state = running();
        scheduler.arm(&state, 20).await;

        assert!(scheduler.suspend(&state).await);
        assert!(!scheduler.suspend(&state).await);
        assert!(alarms.is_empty());
        assert_eq!(state.snapshot().status, Status::Running);

        // a navigation while suspended only records the new dwell
        scheduler.arm(&state, 7).await;
        assert!(alarms.is_empty());

        assert!(scheduler.resume(&state).await);
        assert_eq!(alarms.len(), 2);
        assert_eq!(scheduler.tick(&state).await, Some(7));
    }

    #[tokio::test]
    async fn recover_rearms_missing_alarm() {
        let (scheduler, alarms) = scheduler();
        let state = running();
        state.update(|s| s.rotation_end_time = Some(Utc::now() + Duration::seconds(30)));

        assert!(scheduler.recover(&state).await);
        assert!(alarms.get(ROTATION_ALARM).await.unwrap().is_some());
        assert!(!scheduler.recover(&state).await);
    }

    #[tokio::test]
    async fn recover_after_elapsed_dwell_uses_default_interval() {
        let (scheduler, _alarms) = scheduler();
        let state = running();
        state.update(|s| {
            s.global_config.default_interval = 30;
            s.rotation_end_time = Some(Utc::now() - Duration::seconds(100));
        });

        assert!(scheduler.recover(&state).await);
        assert_eq!(scheduler.tick(&state).await, Some(30));
    }

    #[tokio::test]
    async fn arm_outside_running_leaves_no_timer() {
        let (scheduler, alarms) = scheduler();
        let state = running();
        scheduler.arm(&state, 10).await;
        state.update(|s| s.status = Status::Paused);

        assert!(!scheduler.arm(&state, 10).await);
        assert!(alarms.is_empty());
        assert!(state.snapshot().rotation_end_time.is_none());
    }
}
