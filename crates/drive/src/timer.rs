//! Fixed-rate pacing for the control loop.

use std::time::{Duration, Instant};

/// Sleep that completes a tick of length `period` after `elapsed` of work,
/// never longer than `cap`.
pub fn pacing_sleep(period: Duration, elapsed: Duration, cap: Duration) -> Duration {
    period.saturating_sub(elapsed).min(cap)
}

/// Tick period for `rate_hz`; zero disables pacing.
pub fn period_for(rate_hz: u32) -> Duration {
    if rate_hz == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(1) / rate_hz
    }
}

/// Tracks when the current tick started.
#[derive(Clone, Copy, Debug)]
pub struct PacingTimer {
    mark: Instant,
}

impl PacingTimer {
    /// Start measuring from now.
    pub fn start() -> Self {
        Self {
            mark: Instant::now(),
        }
    }

    pub fn restart(&mut self) {
        self.mark = Instant::now();
    }

    /// Time to sleep so ticks land every `1 / rate_hz` seconds.
    ///
    /// The work done since the previous tick started is subtracted. The mark
    /// moves to the expected wake-up instant, so the next call measures only
    /// the next tick's work.
    pub fn next_sleep(&mut self, rate_hz: u32, cap: Duration) -> Duration {
        let now = Instant::now();
        let sleep = pacing_sleep(period_for(rate_hz), now.saturating_duration_since(self.mark), cap);
        self.mark = now + sleep;
        sleep
    }
}

impl Default for PacingTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn sleep_fills_remaining_period() {
        assert_eq!(pacing_sleep(ms(33), ms(10), ms(1000)), ms(23));
    }

    #[test]
    fn overrun_never_goes_negative() {
        assert_eq!(pacing_sleep(ms(33), ms(50), ms(1000)), Duration::ZERO);
        assert_eq!(pacing_sleep(ms(33), ms(33), ms(1000)), Duration::ZERO);
    }

    #[test]
    fn cap_bounds_the_sleep() {
        assert_eq!(pacing_sleep(ms(100), ms(10), ms(20)), ms(20));
        assert_eq!(pacing_sleep(ms(100), ms(10), Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn period_for_rate() {
        assert_eq!(period_for(0), Duration::ZERO);
        assert_eq!(period_for(4), ms(250));
        assert_eq!(period_for(30), Duration::from_nanos(33_333_333));
    }

    #[test]
    fn timer_accounts_for_work() {
        let mut timer = PacingTimer::start();
        thread::sleep(ms(20));
        let sleep = timer.next_sleep(10, Duration::MAX);
        assert!(sleep <= ms(80), "slept {sleep:?}");
        assert!(sleep >= ms(40), "slept {sleep:?}");
    }

    #[test]
    fn timer_measures_from_expected_wake() {
        let mut timer = PacingTimer::start();
        let first = timer.next_sleep(10, Duration::MAX);
        thread::sleep(first);
        // immediately asking again: almost no work done, so nearly a full period
        let second = timer.next_sleep(10, Duration::MAX);
        assert!(second >= ms(80), "second sleep {second:?}");
    }
}
