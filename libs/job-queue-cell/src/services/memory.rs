use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use shared_config::AppConfig;

use crate::services::store::JobStore;
use crate::{Job, JobCounts, JobQueueError, QueueName};

struct Entry {
    job: Job,
    leased_until: Option<DateTime<Utc>>,
    seq: u64,
}

impl Entry {
    fn is_active(&self) -> bool {
        self.leased_until.is_some()
    }
}

#[derive(Default)]
struct QueueState {
    live: HashMap<String, Entry>,
    completed: VecDeque<String>,
    failed: VecDeque<Job>,
}

impl QueueState {
    fn release_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut released = 0;
        for entry in self.live.values_mut() {
            if entry.leased_until.is_some_and(|deadline| deadline <= now) {
                entry.leased_until = None;
                released += 1;
            }
        }
        released
    }
}

/// Process-local `JobStore`. Jobs do not survive a restart.
pub struct InMemoryJobStore {
    queues: Mutex<HashMap<QueueName, QueueState>>,
    lease: Duration,
    failed_retention: usize,
    completed_retention: usize,
    next_seq: AtomicU64,
}

impl InMemoryJobStore {
    pub fn new(failed_retention: usize) -> Self {
        let defaults = AppConfig::default();
        Self {
            queues: Mutex::new(HashMap::new()),
            lease: Duration::seconds(defaults.job_lease_seconds as i64),
            failed_retention: failed_retention.max(1),
            completed_retention: defaults.completed_job_retention,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.failed_job_retention)
            .with_lease(Duration::seconds(i64::try_from(config.job_lease_seconds.max(1)).unwrap_or(i64::MAX)))
            .with_completed_retention(config.completed_job_retention)
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_completed_retention(mut self, retention: usize) -> Self {
        self.completed_retention = retention.max(1);
        self
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Keys currently live on a queue, in no particular order.
    pub async fn live_keys(&self, queue: QueueName) -> Vec<String> {
        self.queues.lock().await
            .get(&queue)
            .map(|state| state.live.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn reschedule(&self, job: Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError> {
        let seq = self.seq();
        let mut queues = self.queues.lock().await;
        let state = queues.entry(job.queue).or_default();
        let entry = state.live.get_mut(&job.key)
            .ok_or_else(|| JobQueueError::JobNotFound(job.key.clone()))?;

        entry.job = Job { not_before, ..job };
        entry.leased_until = None;
        entry.seq = seq;
        Ok(())
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(500)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn add(&self, job: Job) -> Result<bool, JobQueueError> {
        let seq = self.seq();
        let mut queues = self.queues.lock().await;
        let state = queues.entry(job.queue).or_default();

        if state.live.contains_key(&job.key) {
            return Ok(false);
        }
        state.live.insert(job.key.clone(), Entry { job, leased_until: None, seq });
        Ok(true)
    }

    async fn get(&self, queue: QueueName, key: &str) -> Result<Option<Job>, JobQueueError> {
        Ok(self.queues.lock().await
            .get(&queue)
            .and_then(|state| state.live.get(key))
            .map(|entry| entry.job.clone()))
    }

    async fn remove(&self, queue: QueueName, key: &str) -> Result<bool, JobQueueError> {
        let mut queues = self.queues.lock().await;
        let Some(state) = queues.get_mut(&queue) else {
            return Ok(false);
        };

        match state.live.get(key) {
            Some(entry) if !entry.is_active() => {
                state.live.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_due(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Option<Job>, JobQueueError> {
        let mut queues = self.queues.lock().await;
        let Some(state) = queues.get_mut(&queue) else {
            return Ok(None);
        };
        state.release_expired(now);

        let next = state.live.values_mut()
            .filter(|entry| !entry.is_active() && entry.job.not_before <= now)
            .min_by_key(|entry| (entry.job.not_before, entry.seq));

        let lease = self.lease;
        Ok(next.map(|entry| {
            entry.leased_until = Some(now + lease);
            entry.job.clone()
        }))
    }

    async fn recover_stalled(&self, queue: QueueName, now: DateTime<Utc>) -> Result<usize, JobQueueError> {
        Ok(self.queues.lock().await
            .get_mut(&queue)
            .map(|state| state.release_expired(now))
            .unwrap_or(0))
    }

    async fn complete(&self, job: &Job, _now: DateTime<Utc>) -> Result<(), JobQueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(job.queue).or_default();

        state.live.remove(&job.key);
        state.completed.retain(|key| key != &job.key);
        state.completed.push_front(job.key.clone());
        state.completed.truncate(self.completed_retention);
        Ok(())
    }

    async fn was_completed(&self, queue: QueueName, key: &str) -> Result<bool, JobQueueError> {
        Ok(self.queues.lock().await
            .get(&queue)
            .is_some_and(|state| state.completed.iter().any(|done| done == key)))
    }

    async fn retry(&self, job: &Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError> {
        self.reschedule(job.clone(), not_before).await
    }

    async fn repeat(&self, job: &Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError> {
        let fresh = Job {
            attempts: 0,
            last_error: None,
            ..job.clone()
        };
        self.reschedule(fresh, not_before).await
    }

    async fn fail(&self, job: &Job) -> Result<(), JobQueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(job.queue).or_default();

        state.live.remove(&job.key);
        state.failed.push_front(job.clone());
        state.failed.truncate(self.failed_retention);
        Ok(())
    }

    async fn failed(&self, queue: QueueName, limit: usize) -> Result<Vec<Job>, JobQueueError> {
        Ok(self.queues.lock().await
            .get(&queue)
            .map(|state| state.failed.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn counts(&self, queue: QueueName, now: DateTime<Utc>) -> Result<JobCounts, JobQueueError> {
        let queues = self.queues.lock().await;
        let mut counts = JobCounts::default();

        if let Some(state) = queues.get(&queue) {
            for entry in state.live.values() {
                if entry.is_active() {
                    counts.active += 1;
                } else if entry.job.not_before <= now {
                    counts.waiting += 1;
                } else {
                    counts.delayed += 1;
                }
            }
            counts.failed = state.failed.len() as u64;
        }

        Ok(counts)
    }
}
