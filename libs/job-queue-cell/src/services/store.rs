use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Job, JobCounts, JobQueueError, QueueName};

/// Durable home of delayed jobs.
///
/// A key is *live* while its job is waiting, delayed or active. A claimed job
/// holds a lease; once the lease runs out without a completion the job is
/// handed out again. Completed keys are remembered in a capped per-queue
/// record, failed jobs move to a capped per-queue list.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores the job unless its key is already live. Returns whether it was added.
    async fn add(&self, job: Job) -> Result<bool, JobQueueError>;

    async fn get(&self, queue: QueueName, key: &str) -> Result<Option<Job>, JobQueueError>;

    /// Drops a waiting or delayed job. An active job is left running.
    async fn remove(&self, queue: QueueName, key: &str) -> Result<bool, JobQueueError>;

    /// Takes the earliest job due at `now` and leases it. Jobs whose lease
    /// expired are put back first.
    async fn claim_due(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Option<Job>, JobQueueError>;

    /// Puts active jobs whose lease ran out at `now` back in line. Returns how many.
    async fn recover_stalled(&self, queue: QueueName, now: DateTime<Utc>) -> Result<usize, JobQueueError>;

    async fn complete(&self, job: &Job, now: DateTime<Utc>) -> Result<(), JobQueueError>;

    /// Whether the key is among the recently completed jobs of the queue.
    async fn was_completed(&self, queue: QueueName, key: &str) -> Result<bool, JobQueueError>;

    /// Puts a failed job back with its updated attempt count.
    async fn retry(&self, job: &Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError>;

    /// Re-arms a recurring job under the same key with a fresh attempt budget.
    async fn repeat(&self, job: &Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError>;

    async fn fail(&self, job: &Job) -> Result<(), JobQueueError>;

    /// Most recently failed jobs first.
    async fn failed(&self, queue: QueueName, limit: usize) -> Result<Vec<Job>, JobQueueError>;

    async fn counts(&self, queue: QueueName, now: DateTime<Utc>) -> Result<JobCounts, JobQueueError>;
}
