//! Activity dispatch helpers
//!
//! Activities fire in a globally deterministic order per command:
//!
//! - During workflow initialization, tasks enabled by the start condition
//!   fire `onEnabled` *before* the workflow's `onInitialized`, which fires
//!   before `onStarted`. The early `onEnabled` looks reversed but is
//!   intentional: definitions rely on it to seed the cycle's work items
//!   before any workflow-level hook observes the start.
//! - On downstream transitions, the deepest element fires first; observer
//!   hooks (`onWorkItemStateChanged`, `onWorkflowStateChanged`) fire
//!   immediately after the state they observe; the owning element's own
//!   transition hook fires last.
//! - Cancellation cascades run bottom-up: work items, then tasks, then
//!   child workflows, then composite tasks, then the workflow, each firing
//!   `onCanceled` exactly once.
//!
//! The executor encodes that order in its call sites; this module provides
//! the uniform run-and-collect wrapper around a single hook invocation.

use super::{ActivityContext, ActivityError, ActivityRequest};
use crate::error::EngineError;

/// Wrap a hook error for surfacing to the caller
pub(crate) fn hook_failure(hook: &str, source: ActivityError) -> EngineError {
    EngineError::ActivityFailure {
        hook: hook.to_string(),
        source,
    }
}

/// Run one hook and collect the requests it enqueued
///
/// A hook error aborts the command; requests from earlier hooks that were
/// already applied stay in the transaction, which is discarded wholesale on
/// abort.
pub(crate) fn run_hook<F>(
    hook: &str,
    ctx: &mut ActivityContext,
    f: F,
) -> Result<Vec<ActivityRequest>, EngineError>
where
    F: FnOnce(&mut ActivityContext) -> Result<(), ActivityError>,
{
    f(ctx).map_err(|e| hook_failure(hook, e))?;
    Ok(ctx.take_requests())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_run_hook_collects_requests() {
        let mut ctx = ActivityContext::for_task(Uuid::now_v7(), Uuid::now_v7(), "t", 1);
        let requests = run_hook("task.onEnabled", &mut ctx, |ctx| {
            ctx.initialize_work_item(serde_json::json!({}));
            Ok(())
        })
        .unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[test]
    fn test_run_hook_wraps_errors() {
        let mut ctx = ActivityContext::for_workflow(Uuid::now_v7(), Uuid::now_v7());
        let err = run_hook("workflow.onStarted", &mut ctx, |_| {
            Err(ActivityError::new("nope"))
        })
        .unwrap_err();

        match err {
            EngineError::ActivityFailure { hook, source } => {
                assert_eq!(hook, "workflow.onStarted");
                assert_eq!(source.message, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
