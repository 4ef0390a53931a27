//! Global share accounting.
//!
//! Three independent monotonic counters, incremented atomically from any
//! submission path and read periodically by the status loop. No snapshot
//! consistency across the three is guaranteed or needed; they are reported
//! together only as a human-readable summary.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Accepted / rejected / stale share counts for the process lifetime.
///
/// Created at orchestrator construction and passed explicitly to every task
/// that classifies submissions. Pool sources keep their own instance, which
/// the status loop prefers in pool mode.
#[derive(Debug, Default)]
pub struct ShareCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    stale: AtomicU64,
}

impl ShareCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ShareSnapshot {
        ShareSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the share counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShareSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub stale: u64,
}

impl ShareSnapshot {
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected + self.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_start_at_zero() {
        let snapshot = ShareCounters::new().snapshot();
        assert_eq!(snapshot, ShareSnapshot::default());
        assert_eq!(snapshot.total(), 0);
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        let counters = Arc::new(ShareCounters::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counters = counters.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    counters.record_accepted();
                }
                for _ in 0..300 {
                    counters.record_rejected();
                }
                for _ in 0..200 {
                    counters.record_stale();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.accepted, 8000);
        assert_eq!(snapshot.rejected, 2400);
        assert_eq!(snapshot.stale, 1600);
        assert_eq!(snapshot.total(), 12000);
    }
}
