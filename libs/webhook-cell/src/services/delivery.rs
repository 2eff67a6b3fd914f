use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};
use uuid::Uuid;

use job_queue_cell::{Job, JobOutcome, JobPayload, JobProcessor};
use shared_config::AppConfig;
use shared_database::BookingStore;
use shared_models::{AppError, WebhookEnvelope, WebhookUpdate};
use shared_utils::{sign_payload, SIGNATURE_HEADER};

/// Processor for the `webhooks` queue: signs and POSTs one envelope to one subscriber.
pub struct WebhookDeliveryProcessor {
    store: Arc<dyn BookingStore>,
    client: Client,
    timeout: Duration,
}

impl WebhookDeliveryProcessor {
    pub fn new(store: Arc<dyn BookingStore>, config: &AppConfig) -> Self {
        Self {
            store,
            client: Client::new(),
            timeout: Duration::from_secs(config.webhook_timeout_seconds),
        }
    }

    async fn deliver(&self, subscription_id: Uuid, envelope: &WebhookEnvelope) -> Result<JobOutcome, AppError> {
        let subscription = match self.store.find_webhook(subscription_id).await? {
            Some(subscription) if subscription.is_active => subscription,
            _ => {
                return Ok(JobOutcome::Skipped {
                    reason: format!("Webhook {} not found or inactive", subscription_id),
                });
            }
        };

        // The receiver verifies the signature over exactly these bytes
        let body = serde_json::to_vec(envelope)
            .map_err(|e| AppError::Terminal(format!("Envelope not serializable: {}", e)))?;

        let mut request = self.client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout);

        if let Some(secret) = subscription.secret.as_deref().filter(|s| !s.is_empty()) {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        let response = request.body(body).send().await.map_err(|e| {
            AppError::Transient(format!("Webhook {} unreachable: {}", subscription.id, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(AppError::Transient(format!(
                "Webhook {} answered HTTP {}: {}",
                subscription.id, status, error_body
            )));
        }

        debug!("Webhook delivery successful: {} -> {} (status: {})", envelope.event, subscription.url, status);
        Ok(JobOutcome::Completed)
    }
}

#[async_trait]
impl JobProcessor for WebhookDeliveryProcessor {
    async fn process(&self, job: &Job) -> Result<JobOutcome, AppError> {
        match &job.payload {
            JobPayload::WebhookDelivery { subscription_id, envelope } => {
                self.deliver(*subscription_id, envelope).await
            }
            other => Err(AppError::InvalidArgument(format!(
                "Unexpected {} job on webhooks queue",
                other.kind()
            ))),
        }
    }

    /// Deactivates a subscriber once a delivery has used up its attempts.
    async fn on_exhausted(&self, job: &Job, error: &AppError) -> Result<(), AppError> {
        let JobPayload::WebhookDelivery { subscription_id, .. } = &job.payload else {
            return Ok(());
        };

        warn!(
            "Webhook {} deactivated after {} failed attempts: {}",
            subscription_id, job.attempts, error
        );
        self.store.update_webhook(*subscription_id, &WebhookUpdate::deactivate()).await?;
        info!("Webhook {} is now inactive", subscription_id);
        Ok(())
    }
}
