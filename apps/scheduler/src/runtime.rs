use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use appointment_cell::{DailyReminderRunner, ExpirationProcessor, ReminderProcessor};
use job_queue_cell::{
    InMemoryJobStore, JobProcessor, JobQueueError, JobScheduler, JobStore, JobWorkerService,
    QueueName, RedisJobStore, WorkerConfig,
};
use shared_config::AppConfig;
use shared_database::{BookingStore, InMemoryStore, SupabaseStore};
use shared_utils::{Clock, SystemClock};
use webhook_cell::WebhookDeliveryProcessor;

/// Stores, scheduler and one worker pool per queue.
pub struct Runtime {
    pub scheduler: Arc<JobScheduler>,
    workers: Vec<Arc<JobWorkerService>>,
}

impl Runtime {
    pub async fn build(config: Arc<AppConfig>, shutdown: watch::Receiver<bool>) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store: Arc<dyn BookingStore> = if config.is_configured() {
            info!("Using Supabase store at {}", config.supabase_url);
            Arc::new(SupabaseStore::new(&config))
        } else {
            warn!("Supabase not configured, using in-memory store");
            Arc::new(InMemoryStore::new())
        };

        let jobs: Arc<dyn JobStore> = if config.is_redis_configured() {
            Arc::new(
                RedisJobStore::new(&config)
                    .await
                    .context("failed to connect to the Redis job store")?,
            )
        } else {
            Arc::new(InMemoryJobStore::from_config(&config))
        };

        let scheduler = Arc::new(JobScheduler::new(jobs.clone(), config.clone(), clock.clone()));

        let daily = DailyReminderRunner::new(store.clone(), scheduler.clone(), clock.clone());
        let processors: [(QueueName, Arc<dyn JobProcessor>); 3] = [
            (QueueName::Reminders, Arc::new(ReminderProcessor::new(store.clone(), daily, clock.clone()))),
            (QueueName::Expirations, Arc::new(ExpirationProcessor::new(store.clone()))),
            (QueueName::Webhooks, Arc::new(WebhookDeliveryProcessor::new(store.clone(), &config))),
        ];

        let workers = processors
            .into_iter()
            .map(|(queue, processor)| {
                Arc::new(JobWorkerService::new(
                    queue,
                    WorkerConfig::for_queue(queue, &config),
                    scheduler.options(queue),
                    jobs.clone(),
                    processor,
                    clock.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        Ok(Self { scheduler, workers })
    }

    pub fn spawn_workers(&self) -> Vec<JoinHandle<Result<(), JobQueueError>>> {
        self.workers
            .iter()
            .cloned()
            .map(|worker| tokio::spawn(async move { worker.start().await }))
            .collect()
    }
}
