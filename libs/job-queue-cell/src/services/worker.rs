use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use shared_models::AppError;
use shared_utils::Clock;

use crate::services::store::JobStore;
use crate::{Job, JobOutcome, JobQueueError, QueueName, QueueOptions, WorkerConfig};

/// Runs the jobs of one queue.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<JobOutcome, AppError>;

    /// Called once a job has used its last attempt or failed for good.
    async fn on_exhausted(&self, _job: &Job, _error: &AppError) -> Result<(), AppError> {
        Ok(())
    }
}

/// Pool of concurrent loops draining one queue.
pub struct JobWorkerService {
    worker_id: String,
    queue: QueueName,
    config: WorkerConfig,
    options: QueueOptions,
    store: Arc<dyn JobStore>,
    processor: Arc<dyn JobProcessor>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
}

impl JobWorkerService {
    pub fn new(
        queue: QueueName,
        config: WorkerConfig,
        options: QueueOptions,
        store: Arc<dyn JobStore>,
        processor: Arc<dyn JobProcessor>,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            queue,
            config,
            options,
            store,
            processor,
            clock,
            shutdown,
        }
    }

    /// Runs until the shutdown channel flips to `true`. In-flight jobs finish first.
    #[instrument(skip(self), fields(queue = %self.queue))]
    pub async fn start(&self) -> Result<(), JobQueueError> {
        info!("Starting worker {} with {} loops", self.worker_id, self.config.concurrency);

        let recovered = self.store.recover_stalled(self.queue, self.clock.now()).await?;
        if recovered > 0 {
            info!("Worker {} put {} stalled jobs back on {}", self.worker_id, recovered, self.queue);
        }

        let mut handles = Vec::new();
        for i in 0..self.config.concurrency {
            let worker_clone = self.clone_for_worker();
            let worker_name = format!("{}-{}", self.worker_id, i);

            handles.push(tokio::spawn(async move {
                worker_clone.worker_loop(worker_name).await
            }));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker loop on {} panicked: {}", self.queue, e);
            }
        }

        info!("Worker {} stopped", self.worker_id);
        Ok(())
    }

    async fn worker_loop(&self, worker_name: String) {
        debug!("Worker loop started: {}", worker_name);
        let mut shutdown = self.shutdown.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        loop {
            if *shutdown.borrow() {
                debug!("Worker {} received shutdown signal", worker_name);
                break;
            }

            let idle_for = match self.process_next().await {
                Ok(true) => continue,
                Ok(false) => poll_interval,
                Err(e) => {
                    error!("Worker {} failed to claim job: {}", worker_name, e);
                    poll_interval * 10
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(idle_for) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
    }

    /// Claims and runs at most one due job, picking up jobs whose lease ran out.
    /// Returns whether a job was run.
    pub async fn process_next(&self) -> Result<bool, JobQueueError> {
        match self.store.claim_due(self.queue, self.clock.now()).await? {
            Some(job) => {
                self.process_job(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, job), fields(queue = %self.queue, job_key = %job.key))]
    async fn process_job(&self, mut job: Job) -> Result<(), JobQueueError> {
        debug!("Processing {} job {}", job.payload.kind(), job.key);

        let job_timeout = Duration::from_secs(self.config.job_timeout_seconds);
        let result = match timeout(job_timeout, self.processor.process(&job)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Transient(format!(
                "Job timed out after {} seconds",
                self.config.job_timeout_seconds
            ))),
        };

        match result {
            Ok(JobOutcome::Completed) => {
                self.store.complete(&job, self.clock.now()).await?;
                debug!("Job {} completed", job.key);
            }
            Ok(JobOutcome::Skipped { reason }) => {
                self.store.complete(&job, self.clock.now()).await?;
                info!("Job {} skipped: {}", job.key, reason);
            }
            Ok(JobOutcome::Repeat { next_run }) => {
                self.store.repeat(&job, next_run).await?;
                debug!("Job {} re-armed for {}", job.key, next_run);
            }
            Err(e) => {
                job.attempts += 1;
                job.last_error = Some(e.to_string());

                if e.is_retryable() && job.attempts_remaining() {
                    let not_before = self.clock.now() + self.options.backoff_delay(job.attempts);
                    warn!(
                        "Job {} failed (attempt {}/{}), retrying at {}: {}",
                        job.key, job.attempts, job.max_attempts, not_before, e
                    );
                    self.store.retry(&job, not_before).await?;
                } else {
                    error!("Job {} failed permanently after {} attempts: {}", job.key, job.attempts, e);
                    self.store.fail(&job).await?;

                    if let Err(hook_error) = self.processor.on_exhausted(&job, &e).await {
                        error!("Exhaustion handler for job {} failed: {}", job.key, hook_error);
                    }
                }
            }
        }

        Ok(())
    }

    fn clone_for_worker(&self) -> Self {
        Self {
            worker_id: self.worker_id.clone(),
            queue: self.queue,
            config: self.config.clone(),
            options: self.options,
            store: Arc::clone(&self.store),
            processor: Arc::clone(&self.processor),
            clock: Arc::clone(&self.clock),
            shutdown: self.shutdown.clone(),
        }
    }
}
