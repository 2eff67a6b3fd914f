use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::WebhookEnvelope;

pub const DAILY_CHECK_KEY: &str = "daily-reminders-check";

pub fn reminder_key(appointment_id: Uuid) -> String {
    format!("reminder-{}", appointment_id)
}

pub fn expiration_key(appointment_id: Uuid) -> String {
    format!("expiration-{}", appointment_id)
}

pub fn webhook_key(subscription_id: Uuid, envelope_id: Uuid) -> String {
    format!("webhook-{}-{}", subscription_id, envelope_id)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Reminders,
    Expirations,
    Webhooks,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Reminders, QueueName::Expirations, QueueName::Webhooks];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Reminders => "reminders",
            QueueName::Expirations => "expirations",
            QueueName::Webhooks => "webhooks",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retry budget and backoff for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl QueueOptions {
    pub fn for_queue(queue: QueueName, config: &AppConfig) -> Self {
        let max_attempts = match queue {
            QueueName::Reminders => config.reminder_max_attempts,
            QueueName::Expirations => config.expiration_max_attempts,
            QueueName::Webhooks => config.webhook_max_attempts,
        };

        let initial_backoff_ms = match queue {
            QueueName::Webhooks => config.webhook_backoff_ms,
            QueueName::Reminders | QueueName::Expirations => config.queue_backoff_ms,
        };

        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms,
        }
    }

    /// Delay before the next run after the n-th failed attempt: `initial * 2^(n-1)`.
    pub fn backoff_delay(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(20);
        let millis = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Confirmation,
    Cancellation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Confirmation => "confirmation",
            NotificationKind::Cancellation => "cancellation",
        }
    }
}

/// What a job asks its processor to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Reminder {
        appointment_id: Uuid,
    },
    Notification {
        appointment_id: Uuid,
        notification: NotificationKind,
    },
    DailyCheck,
    Expiration {
        appointment_id: Uuid,
    },
    WebhookDelivery {
        subscription_id: Uuid,
        envelope: WebhookEnvelope,
    },
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::Reminder { .. } => "reminder",
            JobPayload::Notification { .. } => "notification",
            JobPayload::DailyCheck => "daily_check",
            JobPayload::Expiration { .. } => "expiration",
            JobPayload::WebhookDelivery { .. } => "webhook_delivery",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub key: String,
    pub queue: QueueName,
    pub payload: JobPayload,
    pub not_before: DateTime<Utc>,
    /// Failed attempts so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        queue: QueueName,
        key: impl Into<String>,
        payload: JobPayload,
        not_before: DateTime<Utc>,
        options: &QueueOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            queue,
            payload,
            not_before,
            attempts: 0,
            max_attempts: options.max_attempts,
            last_error: None,
            created_at: now,
        }
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Result of a successful processor run.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    /// Nothing to do; the job is finished without a retry.
    Skipped { reason: String },
    /// Recurring trigger: run the same key again at `next_run`.
    Repeat { next_run: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: QueueName,
    #[serde(flatten)]
    pub counts: JobCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub concurrency: u32,
    pub poll_interval_ms: u64,
    pub job_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            concurrency: 5,
            poll_interval_ms: 500,
            job_timeout_seconds: 120,
        }
    }
}

impl WorkerConfig {
    pub fn for_queue(queue: QueueName, config: &AppConfig) -> Self {
        Self {
            worker_id: format!("{}-{}", queue, Uuid::new_v4()),
            concurrency: config.worker_concurrency.max(1),
            poll_interval_ms: config.worker_poll_interval_ms,
            job_timeout_seconds: config.job_timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_initial_delay() {
        let options = QueueOptions { max_attempts: 5, initial_backoff_ms: 5000 };
        assert_eq!(options.backoff_delay(1), Duration::seconds(5));
        assert_eq!(options.backoff_delay(2), Duration::seconds(10));
        assert_eq!(options.backoff_delay(4), Duration::seconds(40));
    }

    #[test]
    fn queue_budgets_come_from_config() {
        let config = AppConfig::default();
        assert_eq!(QueueOptions::for_queue(QueueName::Reminders, &config).max_attempts, 3);
        assert_eq!(QueueOptions::for_queue(QueueName::Expirations, &config).max_attempts, 3);
        assert_eq!(QueueOptions::for_queue(QueueName::Webhooks, &config).max_attempts, 5);
    }

    #[test]
    fn webhooks_back_off_independently() {
        let config = AppConfig { webhook_backoff_ms: 250, ..AppConfig::default() };
        assert_eq!(QueueOptions::for_queue(QueueName::Webhooks, &config).initial_backoff_ms, 250);
        assert_eq!(QueueOptions::for_queue(QueueName::Reminders, &config).initial_backoff_ms, 5000);
        assert_eq!(QueueOptions::for_queue(QueueName::Expirations, &config).initial_backoff_ms, 5000);

        let defaults = AppConfig::default();
        assert_eq!(QueueOptions::for_queue(QueueName::Webhooks, &defaults).initial_backoff_ms, 3000);
    }

    #[test]
    fn payload_is_tagged_by_kind() {
        let id = Uuid::nil();
        let value = serde_json::to_value(JobPayload::Notification {
            appointment_id: id,
            notification: NotificationKind::Cancellation,
        })
        .unwrap();

        assert_eq!(value["kind"], "notification");
        assert_eq!(value["notification"], "cancellation");
        assert_eq!(
            serde_json::to_value(JobPayload::DailyCheck).unwrap(),
            serde_json::json!({ "kind": "daily_check" })
        );
    }
}
