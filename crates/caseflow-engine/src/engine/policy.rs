//! Task completion policies
//!
//! A policy is consulted whenever one of a task's work items reaches a
//! terminal state. `Fail` is a transition decision, never an error to the
//! command caller.

use crate::model::WorkItemTotals;

/// Decision returned by a completion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Complete the task now
    Complete,

    /// Fail the task (and, by default, the workflow)
    Fail,

    /// Keep waiting
    Continue,
}

/// Decides whether finalized work items complete, fail or continue a task
pub trait CompletionPolicy: Send + Sync {
    /// Evaluate the summed work-item counters of the current generation
    fn evaluate(&self, totals: &WorkItemTotals) -> PolicyDecision;
}

/// Default policy
///
/// Completes once every work item is terminal and at least one completed.
/// With `any_failure_fatal` (the default), a failed work item fails the
/// task immediately unless some other item already completed. Canceled
/// work items never fail a task on their own.
#[derive(Debug, Clone, Copy)]
pub struct DefaultCompletionPolicy {
    /// Fail the task on the first work-item failure
    pub any_failure_fatal: bool,
}

impl Default for DefaultCompletionPolicy {
    fn default() -> Self {
        Self {
            any_failure_fatal: true,
        }
    }
}

impl CompletionPolicy for DefaultCompletionPolicy {
    fn evaluate(&self, totals: &WorkItemTotals) -> PolicyDecision {
        if self.any_failure_fatal && totals.failed > 0 && totals.completed == 0 {
            return PolicyDecision::Fail;
        }

        if totals.total > 0 && totals.all_settled() {
            if totals.completed > 0 {
                return PolicyDecision::Complete;
            }
            if totals.failed > 0 {
                return PolicyDecision::Fail;
            }
            // Everything canceled: neither success nor failure.
        }

        PolicyDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(
        initialized: u64,
        started: u64,
        completed: u64,
        failed: u64,
        canceled: u64,
    ) -> WorkItemTotals {
        WorkItemTotals {
            total: initialized + started + completed + failed + canceled,
            initialized,
            started,
            completed,
            failed,
            canceled,
        }
    }

    #[test]
    fn test_completes_when_all_settled_and_one_completed() {
        let policy = DefaultCompletionPolicy::default();
        assert_eq!(
            policy.evaluate(&totals(0, 0, 2, 0, 0)),
            PolicyDecision::Complete
        );
        // One canceled, one completed: still a completion.
        assert_eq!(
            policy.evaluate(&totals(0, 0, 1, 0, 1)),
            PolicyDecision::Complete
        );
    }

    #[test]
    fn test_any_failure_is_fatal_by_default() {
        let policy = DefaultCompletionPolicy::default();
        // A failure with work still pending fails immediately.
        assert_eq!(
            policy.evaluate(&totals(1, 0, 0, 1, 0)),
            PolicyDecision::Fail
        );
        // Unless something already completed.
        assert_eq!(
            policy.evaluate(&totals(1, 0, 1, 1, 0)),
            PolicyDecision::Continue
        );
    }

    #[test]
    fn test_lenient_policy_waits_for_settlement() {
        let policy = DefaultCompletionPolicy {
            any_failure_fatal: false,
        };
        assert_eq!(
            policy.evaluate(&totals(1, 0, 0, 1, 0)),
            PolicyDecision::Continue
        );
        assert_eq!(
            policy.evaluate(&totals(0, 0, 0, 2, 0)),
            PolicyDecision::Fail
        );
        assert_eq!(
            policy.evaluate(&totals(0, 0, 1, 1, 0)),
            PolicyDecision::Complete
        );
    }

    #[test]
    fn test_all_canceled_continues() {
        let policy = DefaultCompletionPolicy::default();
        assert_eq!(
            policy.evaluate(&totals(0, 0, 0, 0, 2)),
            PolicyDecision::Continue
        );
    }

    #[test]
    fn test_pending_work_continues() {
        let policy = DefaultCompletionPolicy::default();
        assert_eq!(
            policy.evaluate(&totals(1, 1, 1, 0, 0)),
            PolicyDecision::Continue
        );
    }
}
