//! Deferred jobs: the scheduled-initialization ledger and the timer service

mod ledger;
mod timer;

pub use ledger::{ScheduledEntry, ScheduledKey};
pub use timer::{JobFire, JobScheduler, TokioJobScheduler};
