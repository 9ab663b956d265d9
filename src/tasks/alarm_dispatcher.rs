//! Alarm dispatcher background task

use std::{sync::Arc, time::Duration};
use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::{engine::Engine, host::LocalAlarms};

/// A gap this many poll periods wide between two polls means the machine
/// (or the process) was suspended in between
const WAKE_GAP_FACTOR: i64 = 8;

/// Background task that fires due alarms into the engine.
///
/// Deadlines are compared against the wall clock on every poll, so alarms
/// that came due while the machine slept fire on the first poll after wake.
pub async fn alarm_dispatcher_task(engine: Engine, alarms: Arc<LocalAlarms>, poll: Duration) {
    info!("Starting alarm dispatcher (poll every {:?})", poll);

    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_poll: Option<DateTime<Utc>> = None;

    loop {
        ticker.tick().await;
        let now = Utc::now();

        if let Some(last) = last_poll {
            if is_wake_gap(last, now, poll) {
                info!("System wake-up detected ({}s gap), catching up on alarms", (now - last).num_seconds());
            }
        }
        last_poll = Some(now);

        for name in alarms.take_due(now).await {
            debug!("Alarm {} fired", name);
            engine.on_alarm(&name).await;
        }
    }
}

fn is_wake_gap(last: DateTime<Utc>, now: DateTime<Utc>, poll: Duration) -> bool {
    let gap_ms = (now - last).num_milliseconds();
    let poll_ms = i64::try_from(poll.as_millis()).unwrap_or(i64::MAX);
    gap_ms > poll_ms.saturating_mul(WAKE_GAP_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn long_gap_counts_as_wake() {
        let poll = Duration::from_millis(250);
        let t0 = Utc::now();
        assert!(!is_wake_gap(t0, t0 + ChronoDuration::milliseconds(300), poll));
        assert!(is_wake_gap(t0, t0 + ChronoDuration::seconds(30), poll));
    }
}
