//! In-flight work tracker
//!
//! A concurrent registry of records currently inside the engine. Workers
//! register immediately before the ingest call and release immediately
//! after; a periodic observer scans for entries older than the long-record
//! threshold. Scanning never removes anything.

use crate::metrics;
use engine_gateway::RecordKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct InFlightEntry {
    key: RecordKey,
    worker: usize,
    started: Instant,
}

/// A long-running entry surfaced by `scan`.
#[derive(Debug, Clone)]
pub struct LongRunning {
    pub key: RecordKey,
    pub worker: usize,
    pub elapsed: Duration,
}

/// Concurrent registry of in-flight ingest calls.
#[derive(Debug, Default)]
pub struct WorkTracker {
    entries: Mutex<HashMap<u64, InFlightEntry>>,
    next_token: AtomicU64,
}

impl WorkTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert an entry for a record about to enter the engine.
    ///
    /// The returned token releases the entry, explicitly or on drop.
    pub fn register(self: &Arc<Self>, key: RecordKey, worker: usize) -> TrackerToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut entries = self.entries.lock().expect("work tracker lock poisoned");
            entries.insert(
                token,
                InFlightEntry {
                    key,
                    worker,
                    started: Instant::now(),
                },
            );
            entries.len()
        };
        metrics::set_in_flight(count);

        TrackerToken {
            tracker: Arc::clone(self),
            token,
            released: false,
        }
    }

    fn remove(&self, token: u64) {
        let count = {
            let mut entries = self.entries.lock().expect("work tracker lock poisoned");
            entries.remove(&token);
            entries.len()
        };
        metrics::set_in_flight(count);
    }

    /// Current in-flight count.
    pub fn count(&self) -> usize {
        self.entries.lock().expect("work tracker lock poisoned").len()
    }

    /// Entries older than `threshold`, oldest first.
    ///
    /// Purely observational; safe to run concurrently with
    /// register/release.
    pub fn scan(&self, threshold: Duration) -> Vec<LongRunning> {
        let now = Instant::now();
        let mut overdue: Vec<LongRunning> = self
            .entries
            .lock()
            .expect("work tracker lock poisoned")
            .values()
            .filter_map(|entry| {
                let elapsed = now.duration_since(entry.started);
                (elapsed >= threshold).then(|| LongRunning {
                    key: entry.key.clone(),
                    worker: entry.worker,
                    elapsed,
                })
            })
            .collect();
        overdue.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));
        overdue
    }
}

/// Handle to one in-flight registration.
///
/// Release is idempotent: a worker's completion path and the drop guard on
/// an unwinding task must not race to remove the same entry twice.
#[derive(Debug)]
pub struct TrackerToken {
    tracker: Arc<WorkTracker>,
    token: u64,
    released: bool,
}

impl TrackerToken {
    /// Remove the entry. Calling this twice has no effect the second time.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.remove(self.token);
        }
    }
}

impl Drop for TrackerToken {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> RecordKey {
        RecordKey {
            data_source: "CUSTOMERS".into(),
            record_id: id.into(),
        }
    }

    #[test]
    fn test_register_and_release() {
        let tracker = WorkTracker::new();
        assert_eq!(tracker.count(), 0);

        let mut token = tracker.register(key("1"), 0);
        assert_eq!(tracker.count(), 1);

        token.release();
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let tracker = WorkTracker::new();
        let _other = tracker.register(key("1"), 0);

        let mut token = tracker.register(key("2"), 1);
        assert_eq!(tracker.count(), 2);

        token.release();
        token.release();
        drop(token);
        // Only the released entry is gone; no double-decrement
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let tracker = WorkTracker::new();
        {
            let _token = tracker.register(key("1"), 0);
            assert_eq!(tracker.count(), 1);
        }
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_scan_reports_overdue_only() {
        let tracker = WorkTracker::new();
        let _token = tracker.register(key("slow"), 0);

        // A generous threshold hides the fresh entry
        assert!(tracker.scan(Duration::from_secs(300)).is_empty());

        // Zero threshold is the "everything in flight" snapshot
        let all = tracker.scan(Duration::ZERO);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key.record_id, "slow");
        assert_eq!(all[0].worker, 0);
    }

    #[test]
    fn test_scan_does_not_remove() {
        let tracker = WorkTracker::new();
        let _token = tracker.register(key("1"), 0);

        tracker.scan(Duration::ZERO);
        tracker.scan(Duration::ZERO);
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_scan_elapsed_exceeds_threshold() {
        let tracker = WorkTracker::new();
        let _token = tracker.register(key("slow"), 0);

        std::thread::sleep(Duration::from_millis(30));
        let overdue = tracker.scan(Duration::from_millis(20));
        assert_eq!(overdue.len(), 1);
        assert!(overdue[0].elapsed >= Duration::from_millis(20));
    }

    #[test]
    fn test_concurrent_register_release() {
        let tracker = WorkTracker::new();
        let mut handles = Vec::new();

        for worker in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let mut token = tracker.register(key(&format!("{worker}-{i}")), worker);
                    token.release();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.count(), 0);
    }
}
