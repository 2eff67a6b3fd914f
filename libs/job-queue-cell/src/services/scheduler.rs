use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Appointment, WebhookEnvelope};
use shared_utils::Clock;

use crate::services::store::JobStore;
use crate::{
    expiration_key, reminder_key, webhook_key, Job, JobPayload, JobQueueError, NotificationKind,
    QueueName, QueueOptions, QueueStats, DAILY_CHECK_KEY,
};

const REMINDER_LEAD: i64 = 24 * 60;
const EXPIRATION_GRACE: i64 = 30;

/// Places, cancels and inspects delayed jobs across the three queues.
pub struct JobScheduler {
    store: Arc<dyn JobStore>,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn JobStore>, config: Arc<AppConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    pub fn options(&self, queue: QueueName) -> QueueOptions {
        QueueOptions::for_queue(queue, &self.config)
    }

    async fn enqueue(
        &self,
        queue: QueueName,
        key: String,
        payload: JobPayload,
        not_before: DateTime<Utc>,
    ) -> Result<bool, JobQueueError> {
        let now = self.clock.now();
        let job = Job::new(queue, key, payload, not_before.max(now), &self.options(queue), now);
        self.store.add(job).await
    }

    /// Reminder 24h before the appointment and expiration check 30min after,
    /// both pulled forward to now when already past.
    pub async fn schedule_reminder(&self, appointment: &Appointment) -> Result<(), JobQueueError> {
        let starts_at = appointment.scheduled_at_utc();

        self.enqueue(
            QueueName::Reminders,
            reminder_key(appointment.id),
            JobPayload::Reminder { appointment_id: appointment.id },
            starts_at - Duration::minutes(REMINDER_LEAD),
        ).await?;

        self.enqueue(
            QueueName::Expirations,
            expiration_key(appointment.id),
            JobPayload::Expiration { appointment_id: appointment.id },
            starts_at + Duration::minutes(EXPIRATION_GRACE),
        ).await?;

        debug!("Scheduled reminder and expiration for appointment {}", appointment.id);
        Ok(())
    }

    /// Drops pending reminder and expiration jobs. Missing jobs are fine.
    pub async fn cancel(&self, appointment_id: Uuid) -> Result<(), JobQueueError> {
        let reminder = self.store.remove(QueueName::Reminders, &reminder_key(appointment_id)).await?;
        let expiration = self.store.remove(QueueName::Expirations, &expiration_key(appointment_id)).await?;

        debug!(
            "Cancelled jobs for appointment {} (reminder: {}, expiration: {})",
            appointment_id, reminder, expiration
        );
        Ok(())
    }

    pub async fn enqueue_notification(
        &self,
        appointment_id: Uuid,
        kind: NotificationKind,
    ) -> Result<(), JobQueueError> {
        let now = self.clock.now();
        let key = format!("{}-{}-{}", kind.as_str(), appointment_id, now.timestamp_millis());

        self.enqueue(
            QueueName::Reminders,
            key,
            JobPayload::Notification { appointment_id, notification: kind },
            now,
        ).await?;
        Ok(())
    }

    pub async fn enqueue_webhook_delivery(
        &self,
        subscription_id: Uuid,
        envelope: &WebhookEnvelope,
    ) -> Result<bool, JobQueueError> {
        self.enqueue(
            QueueName::Webhooks,
            webhook_key(subscription_id, envelope.id),
            JobPayload::WebhookDelivery {
                subscription_id,
                envelope: envelope.clone(),
            },
            self.clock.now(),
        ).await
    }

    /// True while the reminder is live and for a while after it has fired.
    pub async fn has_reminder(&self, appointment_id: Uuid) -> Result<bool, JobQueueError> {
        let key = reminder_key(appointment_id);
        if self.store.get(QueueName::Reminders, &key).await?.is_some() {
            return Ok(true);
        }
        self.store.was_completed(QueueName::Reminders, &key).await
    }

    /// Arms the midnight reminder sweep and runs one sweep straight away.
    pub async fn schedule_daily_tasks(&self) -> Result<(), JobQueueError> {
        let now = self.clock.now();

        self.store.remove(QueueName::Reminders, DAILY_CHECK_KEY).await?;
        self.enqueue(
            QueueName::Reminders,
            DAILY_CHECK_KEY.to_string(),
            JobPayload::DailyCheck,
            next_midnight(now),
        ).await?;

        self.enqueue(
            QueueName::Reminders,
            format!("daily-check-immediate-{}", now.timestamp_millis()),
            JobPayload::DailyCheck,
            now,
        ).await?;

        info!("Daily reminder check scheduled for {}", next_midnight(now));
        Ok(())
    }

    pub async fn queue_stats(&self) -> Result<Vec<QueueStats>, JobQueueError> {
        let now = self.clock.now();
        let mut stats = Vec::with_capacity(QueueName::ALL.len());

        for queue in QueueName::ALL {
            stats.push(QueueStats {
                queue,
                counts: self.store.counts(queue, now).await?,
            });
        }

        Ok(stats)
    }
}

/// Start of the next calendar day.
pub fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Duration::days(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}
