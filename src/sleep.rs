//! Sub-millisecond-precision sleeping until an absolute instant.
//!
//! Ported from `clock.py`'s `_sleep_precisely_until`: halve the remaining
//! time and re-sleep until only a sliver is left, then burn cycles on a
//! monotonic clock to land on the target exactly. Halving converges in
//! `O(log(remaining / threshold))` OS sleep calls, and only the final
//! slice is spent busy-waiting.

use std::time::{Duration, Instant};

/// Below this much remaining time, stop sleeping and busy-wait on
/// [`Instant::now`] instead. Kept tunable per spec.md §9 ("keep the
/// ≤500µs busy-wait threshold tunable").
pub const DEFAULT_BUSY_WAIT_THRESHOLD: Duration = Duration::from_micros(500);

/// Sleeps until an absolute [`Instant`] with sub-millisecond accuracy.
///
/// `Instant` is backed by the platform's monotonic clock, so this is not
/// subject to wall-clock jumps (NTP adjustments, DST, manual clock
/// changes) the way sleeping against `SystemTime` would be.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionSleep {
    busy_wait_threshold: Duration,
}

impl PrecisionSleep {
    pub fn new(busy_wait_threshold: Duration) -> Self {
        Self { busy_wait_threshold }
    }

    /// Sleep (coarsely, then precisely) until `target` is reached.
    /// Returns immediately if `target` is already in the past.
    pub fn sleep_until(&self, target: Instant) {
        let now = Instant::now();
        if target <= now {
            return;
        }
        let remaining = target - now;
        if remaining <= self.busy_wait_threshold {
            while Instant::now() < target {
                std::hint::spin_loop();
            }
        } else {
            std::thread::sleep(remaining / 2);
            self.sleep_until(target);
        }
    }
}

impl Default for PrecisionSleep {
    fn default() -> Self {
        Self::new(DEFAULT_BUSY_WAIT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_immediately_for_past_target() {
        let sleeper = PrecisionSleep::default();
        let past = Instant::now() - Duration::from_secs(1);
        let start = Instant::now();
        sleeper.sleep_until(past);
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn sleeps_approximately_the_requested_duration() {
        let sleeper = PrecisionSleep::default();
        let target = Instant::now() + Duration::from_millis(20);
        sleeper.sleep_until(target);
        let now = Instant::now();
        assert!(now >= target);
        assert!(now - target < Duration::from_millis(5));
    }

    #[test]
    fn zero_threshold_still_converges() {
        let sleeper = PrecisionSleep::new(Duration::from_micros(0));
        let target = Instant::now() + Duration::from_millis(5);
        sleeper.sleep_until(target);
        assert!(Instant::now() >= target);
    }
}
