//! Bounded, thread-safe violation storage

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::types::ViolationEvent;

pub type SharedViolationStore = Arc<ViolationStore>;

/// Recent violation events plus a running count per run
///
/// Counts are not reduced by eviction, so the auto-kill threshold sees every
/// violation a run ever caused.
#[derive(Debug)]
pub struct ViolationStore {
    events: RwLock<VecDeque<ViolationEvent>>,
    counts: RwLock<HashMap<u64, usize>>,
    capacity: usize,
}

impl Default for ViolationStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ViolationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            counts: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn shared(capacity: usize) -> SharedViolationStore {
        Arc::new(Self::new(capacity))
    }

    /// Store an event; returns how many violations its run has caused so far
    pub fn record(&self, event: ViolationEvent) -> usize {
        let run_id = event.run_id;
        {
            let mut events = self.events.write();
            if events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(event);
        }
        let mut counts = self.counts.write();
        let count = counts.entry(run_id).or_insert(0);
        *count += 1;
        *count
    }

    pub fn all(&self) -> Vec<ViolationEvent> {
        self.events.read().iter().cloned().collect()
    }

    pub fn for_run(&self, run_id: u64) -> Vec<ViolationEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn count_for_run(&self, run_id: u64) -> usize {
        self.counts.read().get(&run_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
        self.counts.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::rules::{Decision, OperationClass};
    use chrono::Utc;

    fn event(run_id: u64, target: &str) -> ViolationEvent {
        ViolationEvent {
            run_id,
            operation: OperationClass::FileWrite,
            target: Some(target.to_string()),
            decision: Decision::Deny,
            observed_at: Utc::now(),
            raw: format!("cannot create {}: Read-only file system", target),
        }
    }

    #[test]
    fn test_record_counts_per_run() {
        let store = ViolationStore::new(10);
        assert_eq!(store.record(event(1, "/a")), 1);
        assert_eq!(store.record(event(2, "/b")), 1);
        assert_eq!(store.record(event(1, "/c")), 2);

        assert_eq!(store.for_run(1).len(), 2);
        assert_eq!(store.count_for_run(2), 1);
        assert_eq!(store.count_for_run(3), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = ViolationStore::new(2);
        store.record(event(1, "/a"));
        store.record(event(1, "/b"));
        store.record(event(1, "/c"));

        let targets: Vec<_> = store
            .all()
            .into_iter()
            .filter_map(|e| e.target)
            .collect();
        assert_eq!(targets, vec!["/b", "/c"]);
        assert_eq!(store.count_for_run(1), 3);

        store.clear();
        assert!(store.is_empty());
    }
}
