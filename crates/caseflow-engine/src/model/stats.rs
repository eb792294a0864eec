//! Sharded per-task work-item counters
//!
//! Counters are split across N shards to reduce transactional contention on
//! hot tasks in a real document store; shards are summed on read. The shard
//! for a work item is chosen deterministically from its id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WorkItemState;

/// Counters held by one shard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCounters {
    pub total: u64,
    pub initialized: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
}

impl ShardCounters {
    fn slot(&mut self, state: WorkItemState) -> &mut u64 {
        match state {
            WorkItemState::Initialized => &mut self.initialized,
            WorkItemState::Started => &mut self.started,
            WorkItemState::Completed => &mut self.completed,
            WorkItemState::Failed => &mut self.failed,
            WorkItemState::Canceled => &mut self.canceled,
        }
    }
}

/// Summed counters across all shards of one task generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemTotals {
    pub total: u64,
    pub initialized: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
}

impl WorkItemTotals {
    /// Whether every created work item is in a terminal state
    pub fn all_settled(&self) -> bool {
        self.initialized == 0 && self.started == 0
    }
}

/// Sharded counters for one (workflow, task, generation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    shards: Vec<ShardCounters>,
}

impl TaskStats {
    /// Create stats with `shard_count` shards (at least one)
    pub fn new(shard_count: u32) -> Self {
        Self {
            shards: vec![ShardCounters::default(); shard_count.max(1) as usize],
        }
    }

    fn shard_for(&mut self, work_item_id: Uuid) -> &mut ShardCounters {
        let idx = (work_item_id.as_u128() % self.shards.len() as u128) as usize;
        &mut self.shards[idx]
    }

    /// Record a freshly initialized work item
    pub fn record_insert(&mut self, work_item_id: Uuid) {
        let shard = self.shard_for(work_item_id);
        shard.total += 1;
        shard.initialized += 1;
    }

    /// Record a state transition
    ///
    /// The current-state counters always satisfy
    /// `initialized + started + completed + failed + canceled == total`.
    pub fn record_transition(&mut self, work_item_id: Uuid, from: WorkItemState, to: WorkItemState) {
        let shard = self.shard_for(work_item_id);
        let from_slot = shard.slot(from);
        debug_assert!(*from_slot > 0, "stats underflow for state {from}");
        *from_slot = from_slot.saturating_sub(1);
        *shard.slot(to) += 1;
    }

    /// Sum all shards
    pub fn totals(&self) -> WorkItemTotals {
        let mut t = WorkItemTotals::default();
        for s in &self.shards {
            t.total += s.total;
            t.initialized += s.initialized;
            t.started += s.started;
            t.completed += s.completed;
            t.failed += s.failed;
            t.canceled += s.canceled;
        }
        t
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_balance() {
        let mut stats = TaskStats::new(4);
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        stats.record_insert(a);
        stats.record_insert(b);
        stats.record_transition(a, WorkItemState::Initialized, WorkItemState::Started);
        stats.record_transition(a, WorkItemState::Started, WorkItemState::Completed);
        stats.record_transition(b, WorkItemState::Initialized, WorkItemState::Canceled);

        let t = stats.totals();
        assert_eq!(t.total, 2);
        assert_eq!(t.completed, 1);
        assert_eq!(t.canceled, 1);
        assert_eq!(t.initialized + t.started, 0);
        assert_eq!(
            t.initialized + t.started + t.completed + t.failed + t.canceled,
            t.total
        );
        assert!(t.all_settled());
    }

    #[test]
    fn test_zero_shards_clamped_to_one() {
        let stats = TaskStats::new(0);
        assert_eq!(stats.shard_count(), 1);
    }

    #[test]
    fn test_spread_across_shards() {
        let mut stats = TaskStats::new(8);
        for _ in 0..100 {
            stats.record_insert(Uuid::now_v7());
        }
        assert_eq!(stats.totals().total, 100);
    }
}
