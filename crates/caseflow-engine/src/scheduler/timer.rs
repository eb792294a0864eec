//! Deferred-job timer service
//!
//! Jobs are armed only after the registering command commits; a fire
//! re-enters the engine as a fresh command carrying its job id, so the
//! ledger entry can be consumed (or the fire dropped when the entry was
//! reaped by a terminal transition).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::engine::Command;

/// A deferred job coming due
#[derive(Debug)]
pub struct JobFire {
    /// Ledger job id
    pub job_id: Uuid,

    /// Command to execute
    pub command: Command,
}

/// Arms and cancels deferred jobs
pub trait JobScheduler: Send + Sync + 'static {
    /// Arm a job to fire after `delay`
    fn schedule(&self, job_id: Uuid, delay: Duration, command: Command);

    /// Cancel an armed job; returns whether a pending job was found
    fn cancel(&self, job_id: Uuid) -> bool;
}

/// Tokio-backed scheduler
///
/// Each job is a sleeping task; fires flow through an unbounded channel to
/// the engine's dispatch loop. Canceling aborts the sleeper.
pub struct TokioJobScheduler {
    tx: mpsc::UnboundedSender<JobFire>,
    handles: Arc<DashMap<Uuid, JoinHandle<()>>>,
}

impl TokioJobScheduler {
    /// Create a scheduler and the receiving end of its fire channel
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<JobFire>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                handles: Arc::new(DashMap::new()),
            }),
            rx,
        )
    }

    /// Number of jobs currently armed
    pub fn pending_count(&self) -> usize {
        self.handles.len()
    }
}

impl JobScheduler for TokioJobScheduler {
    fn schedule(&self, job_id: Uuid, delay: Duration, command: Command) {
        trace!(%job_id, delay_ms = delay.as_millis() as u64, "arming deferred job");

        let tx = self.tx.clone();
        let handles = self.handles.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handles.remove(&job_id);
            // Receiver gone means the engine shut down; nothing to do.
            let _ = tx.send(JobFire { job_id, command });
        });

        self.handles.insert(job_id, handle);
    }

    fn cancel(&self, job_id: Uuid) -> bool {
        if let Some((_, handle)) = self.handles.remove(&job_id) {
            handle.abort();
            debug!(%job_id, "canceled deferred job");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel_command() -> Command {
        Command::CancelWorkflow {
            workflow_id: Uuid::now_v7(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_after_delay() {
        let (scheduler, mut rx) = TokioJobScheduler::channel();
        let job_id = Uuid::now_v7();

        scheduler.schedule(job_id, Duration::from_millis(200), cancel_command());
        assert_eq!(scheduler.pending_count(), 1);

        let fire = rx.recv().await.expect("job should fire");
        assert_eq!(fire.job_id, job_id);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceled_job_never_fires() {
        let (scheduler, mut rx) = TokioJobScheduler::channel();
        let job_id = Uuid::now_v7();

        scheduler.schedule(job_id, Duration::from_millis(200), cancel_command());
        assert!(scheduler.cancel(job_id));
        assert!(!scheduler.cancel(job_id));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_fire_in_delay_order() {
        let (scheduler, mut rx) = TokioJobScheduler::channel();
        let early = Uuid::now_v7();
        let late = Uuid::now_v7();

        scheduler.schedule(late, Duration::from_millis(300), cancel_command());
        scheduler.schedule(early, Duration::from_millis(100), cancel_command());

        assert_eq!(rx.recv().await.unwrap().job_id, early);
        assert_eq!(rx.recv().await.unwrap().job_id, late);
    }
}
