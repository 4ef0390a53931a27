//! Hash rate measurement and per-device rate tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Windows older than this are reset so the share counter stays bounded and
/// the average keeps tracking recent conditions.
const WINDOW_RESET_AFTER: Duration = Duration::from_secs(120);

/// A hash rate in solutions per second.
///
/// The unit string varies by proof-of-work family ("H/s" for double-hash
/// families, "GPS", graphs per second, for cycle-finding ones), so
/// formatting takes the unit as an argument instead of implementing Display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashRate(pub f64);

impl HashRate {
    /// Format with an SI prefix and the family's unit, e.g. "3.47 MH/s".
    pub fn format(&self, unit: &str) -> String {
        let rate = self.0;
        if rate >= 1e12 {
            format!("{:.2} T{unit}", rate / 1e12)
        } else if rate >= 1e9 {
            format!("{:.2} G{unit}", rate / 1e9)
        } else if rate >= 1e6 {
            format!("{:.2} M{unit}", rate / 1e6)
        } else if rate >= 1e3 {
            format!("{:.2} K{unit}", rate / 1e3)
        } else {
            format!("{rate:.2} {unit}")
        }
    }
}

/// Exponentially weighted average hash rate over a periodically reset window.
///
/// The mine loop calls [`record`](Self::record) with difficulty-one share
/// counts; the device status loop calls [`sample`](Self::sample) on its tick.
/// The average weights the newest sample at 95%, so the reported rate settles
/// quickly after startup or a work change.
#[derive(Debug)]
pub struct HashRateTracker {
    /// Difficulty-one shares accumulated in the current window
    shares: AtomicU64,
    window_start: Mutex<Instant>,
    average: Mutex<f64>,
}

impl HashRateTracker {
    pub fn new() -> Self {
        Self {
            shares: AtomicU64::new(0),
            window_start: Mutex::new(Instant::now()),
            average: Mutex::new(0.0),
        }
    }

    /// Add difficulty-one shares to the current window.
    pub fn record(&self, shares: u64) {
        self.shares.fetch_add(shares, Ordering::Relaxed);
    }

    /// Take a sample and fold it into the average.
    ///
    /// Returns `None` when no shares have accumulated or no measurable time
    /// has elapsed in the window. Resets the window once it has been open
    /// longer than two minutes, regardless of share count.
    pub fn sample(&self) -> Option<HashRate> {
        let mut window_start = self.window_start.lock();
        let elapsed = window_start.elapsed();
        let shares = self.shares.load(Ordering::Relaxed);
        if shares == 0 || elapsed.as_secs() == 0 {
            return None;
        }

        let sample = shares as f64 / elapsed.as_secs_f64();
        let mut average = self.average.lock();
        if *average == 0.0 {
            *average = sample;
        }
        // 5%/95% smoothing, heavily weighted toward the newest sample
        *average = (*average * 50.0 + sample * 950.0) / 1000.0;

        if elapsed > WINDOW_RESET_AFTER {
            *window_start = Instant::now();
            self.shares.store(0, Ordering::Relaxed);
        }

        Some(HashRate(*average))
    }

    /// Current average without taking a new sample.
    pub fn average(&self) -> HashRate {
        HashRate(*self.average.lock())
    }
}

impl Default for HashRateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // Drive the tracker with an explicit window start so tests don't sleep.
    fn backdate(tracker: &HashRateTracker, secs: u64) {
        *tracker.window_start.lock() = Instant::now() - Duration::from_secs(secs);
    }

    #[test]
    fn test_first_sample_equals_raw_rate() {
        let tracker = HashRateTracker::new();
        tracker.record(1000);
        backdate(&tracker, 10);

        let rate = tracker.sample().expect("sample available");
        // (s*50 + s*950)/1000 == s, so the first sample passes through
        assert!((rate.0 - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_second_sample_is_weighted_blend() {
        let tracker = HashRateTracker::new();
        *tracker.average.lock() = 100.0;
        tracker.record(2000);
        backdate(&tracker, 10);

        let rate = tracker.sample().expect("sample available");
        // (100*50 + 200*950)/1000 = 195
        assert!((rate.0 - 195.0).abs() < 1.0);
    }

    #[test]
    fn test_no_shares_yields_no_sample() {
        let tracker = HashRateTracker::new();
        backdate(&tracker, 10);
        assert!(tracker.sample().is_none());
    }

    #[test]
    fn test_no_elapsed_time_yields_no_sample() {
        let tracker = HashRateTracker::new();
        tracker.record(500);
        assert!(tracker.sample().is_none());
    }

    #[test]
    fn test_window_resets_after_two_minutes() {
        let tracker = HashRateTracker::new();
        tracker.record(100);
        backdate(&tracker, 121);

        tracker.sample().expect("sample available");
        assert_eq!(tracker.shares.load(Ordering::Relaxed), 0);
        assert!(tracker.window_start.lock().elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_window_kept_under_two_minutes() {
        let tracker = HashRateTracker::new();
        tracker.record(100);
        backdate(&tracker, 60);

        tracker.sample().expect("sample available");
        assert_eq!(tracker.shares.load(Ordering::Relaxed), 100);
    }

    #[test_case(0.5, "H/s", "0.50 H/s")]
    #[test_case(1_500.0, "H/s", "1.50 KH/s")]
    #[test_case(3_470_000.0, "H/s", "3.47 MH/s")]
    #[test_case(2_000_000_000.0, "GPS", "2.00 GGPS")]
    #[test_case(5e12, "H/s", "5.00 TH/s")]
    fn test_format(rate: f64, unit: &str, expected: &str) {
        assert_eq!(HashRate(rate).format(unit), expected);
    }
}
