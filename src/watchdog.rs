//! Advisory detection of a silently stalled link.
//!
//! BLE links can stop delivering notifications long before the platform
//! reports a disconnect.  The watchdog ticks while connected and flags a
//! possible drop once the store has gone quiet for longer than the
//! threshold.  It never disconnects; the flag is cleared by the store itself
//! on the next telemetry update.

use std::time::Duration;

use log::warn;
use tokio::time::Instant;

use crate::store::TelemetryStore;
use crate::timer::Schedule;
use crate::types::ConnectionState;

#[derive(Debug)]
pub struct LivenessWatchdog {
    period: Duration,
    threshold: Duration,
    schedule: Schedule,
}

impl LivenessWatchdog {
    pub fn new(period: Duration, threshold: Duration) -> Self {
        Self {
            period,
            threshold,
            schedule: Schedule::new(),
        }
    }

    pub fn start(&mut self) {
        self.schedule.arm_every(self.period);
    }

    pub fn stop(&mut self) {
        self.schedule.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.schedule.is_armed()
    }

    /// Resolves on the next tick.  Pending forever while stopped.
    pub async fn tick(&mut self) {
        self.schedule.fired().await
    }

    /// Run one check.  Returns `true` when this call raised the flag.
    ///
    /// Only the possible-drop flag is ever written.
    pub fn inspect(&self, state: ConnectionState, store: &mut TelemetryStore, now: Instant) -> bool {
        if state != ConnectionState::Connected || store.possible_drop() {
            return false;
        }
        let Some(last) = store.last_update() else {
            return false;
        };
        let silent = now.saturating_duration_since(last);
        if silent > self.threshold {
            warn!("no telemetry for {} ms, possible drop", silent.as_millis());
            store.raise_possible_drop();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DROP_THRESHOLD, WATCHDOG_PERIOD};

    fn watchdog() -> LivenessWatchdog {
        LivenessWatchdog::new(WATCHDOG_PERIOD, DROP_THRESHOLD)
    }

    #[tokio::test(start_paused = true)]
    async fn flags_after_threshold_of_silence() {
        let wd = watchdog();
        let mut store = TelemetryStore::new();
        store.update_live_metrics(0, 50, 50);

        tokio::time::advance(Duration::from_millis(3000)).await;
        assert!(!wd.inspect(ConnectionState::Connected, &mut store, Instant::now()));
        assert!(!store.possible_drop());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(wd.inspect(ConnectionState::Connected, &mut store, Instant::now()));
        assert!(store.possible_drop());

        // Already raised: no second report.
        assert!(!wd.inspect(ConnectionState::Connected, &mut store, Instant::now()));

        store.update_live_metrics(0, 50, 50);
        assert!(!store.possible_drop());
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_silence_unless_connected() {
        let wd = watchdog();
        let mut store = TelemetryStore::new();
        store.update_live_metrics(0, 50, 50);
        tokio::time::advance(Duration::from_secs(10)).await;
        for state in [
            ConnectionState::Idle,
            ConnectionState::Scanning,
            ConnectionState::Connecting,
        ] {
            assert!(!wd.inspect(state, &mut store, Instant::now()));
        }
        assert!(!store.possible_drop());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period_while_running() {
        let mut wd = watchdog();
        assert!(!wd.is_running());
        wd.start();
        let start = Instant::now();
        wd.tick().await;
        wd.tick().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
        wd.stop();
        assert!(!wd.is_running());
    }
}
