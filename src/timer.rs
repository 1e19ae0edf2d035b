//! A cancellable one-shot or periodic deadline on the tokio clock.
//!
//! Both the scan bound and the watchdog tick are a [`Schedule`].  Because it
//! is built on `tokio::time`, tests running with a paused clock
//! (`#[tokio::test(start_paused = true)]`) advance it deterministically.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Every(Duration),
}

/// An optional deadline.  Disarmed, [`Schedule::fired`] never completes.
#[derive(Debug, Default)]
pub struct Schedule {
    next: Option<(Instant, Mode)>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire once, `delay` from now.  Replaces any previous arming.
    pub fn arm_once(&mut self, delay: Duration) {
        self.next = Some((Instant::now() + delay, Mode::Once));
    }

    /// Fire every `period`, starting one period from now.
    pub fn arm_every(&mut self, period: Duration) {
        self.next = Some((Instant::now() + period, Mode::Every(period)));
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next.map(|(at, _)| at)
    }

    /// Wait for the next deadline.  A one-shot schedule disarms itself; a
    /// periodic one re-arms for the following period.
    ///
    /// Cancel-safe: if the future is dropped before completing, the schedule
    /// is unchanged.
    pub async fn fired(&mut self) {
        let Some((at, mode)) = self.next else {
            return std::future::pending().await;
        };
        sleep_until(at).await;
        self.next = match mode {
            Mode::Once => None,
            Mode::Every(period) => {
                // Skip ticks missed while nobody was polling.
                let mut next = at + period;
                let now = Instant::now();
                while next <= now {
                    next += period;
                }
                Some((next, mode))
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn once_fires_then_disarms() {
        let start = Instant::now();
        let mut s = Schedule::new();
        s.arm_once(Duration::from_secs(10));
        s.fired().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(10));
        assert!(!s.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn every_rearms() {
        let start = Instant::now();
        let mut s = Schedule::new();
        s.arm_every(Duration::from_secs(1));
        s.fired().await;
        s.fired().await;
        s.fired().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(3));
        assert!(s.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_never_fires() {
        let mut s = Schedule::new();
        s.arm_once(Duration::from_secs(1));
        s.cancel();
        let res = tokio::time::timeout(Duration::from_secs(60), s.fired()).await;
        assert!(res.is_err());
    }
}
