use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use job_queue_cell::JobScheduler;
use shared_database::BookingStore;
use shared_models::{
    AppError, NewWebhookSubscription, WebhookEnvelope, WebhookEventType, WebhookFilter,
    WebhookSubscription, WebhookUpdate,
};
use shared_utils::Clock;

use crate::models::{RegisterWebhookRequest, TestDelivery, UpdateWebhookRequest};

const MIN_NAME_LEN: usize = 3;

/// Administration of webhook subscriptions.
pub struct WebhookRegistry {
    store: Arc<dyn BookingStore>,
    scheduler: Arc<JobScheduler>,
    clock: Arc<dyn Clock>,
}

impl WebhookRegistry {
    pub fn new(store: Arc<dyn BookingStore>, scheduler: Arc<JobScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self { store, scheduler, clock }
    }

    pub async fn register(
        &self,
        request: RegisterWebhookRequest,
        created_by: Uuid,
    ) -> Result<WebhookSubscription, AppError> {
        validate_name(&request.name)?;
        validate_url(&request.url)?;
        let events = parse_events(&request.events)?;

        self.ensure_url_free(&request.url, None).await?;

        let subscription = self.store.create_webhook(&NewWebhookSubscription {
            name: request.name,
            url: request.url,
            secret: request.secret.filter(|secret| !secret.is_empty()),
            events,
            created_by,
        }).await?;

        info!("Registered webhook {} for {}", subscription.id, subscription.url);
        Ok(subscription)
    }

    pub async fn update(&self, id: Uuid, request: UpdateWebhookRequest) -> Result<WebhookSubscription, AppError> {
        self.get(id).await?;

        if let Some(name) = &request.name {
            validate_name(name)?;
        }
        if let Some(url) = &request.url {
            validate_url(url)?;
            self.ensure_url_free(url, Some(id)).await?;
        }
        let events = match &request.events {
            Some(raw) => Some(parse_events(raw)?),
            None => None,
        };

        let update = WebhookUpdate {
            name: request.name,
            url: request.url,
            secret: request.secret,
            events,
            is_active: request.is_active,
        };

        let subscription = self.store.update_webhook(id, &update).await?;
        debug!("Updated webhook {}", id);
        Ok(subscription)
    }

    pub async fn list(&self) -> Result<Vec<WebhookSubscription>, AppError> {
        self.store.find_webhooks(&WebhookFilter::default()).await
    }

    pub async fn get(&self, id: Uuid) -> Result<WebhookSubscription, AppError> {
        self.store
            .find_webhook(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Webhook {} not found", id)))
    }

    /// Queues a sample delivery to this subscriber only, on its first event type.
    pub async fn send_test(&self, id: Uuid) -> Result<TestDelivery, AppError> {
        let subscription = self.get(id).await?;
        if !subscription.is_active {
            return Err(AppError::PolicyViolation(format!(
                "Webhook {} is inactive; activate it before testing",
                id
            )));
        }

        let event = *subscription.events.first().ok_or_else(|| {
            AppError::InvalidArgument(format!("Webhook {} has no events", id))
        })?;

        let now = self.clock.now();
        let envelope = WebhookEnvelope::new(event, now, json!({
            "id": format!("test-{}", now.timestamp_millis()),
            "message": format!("Test webhook sent at {}", now.to_rfc3339()),
            "test": true,
        }));

        self.scheduler.enqueue_webhook_delivery(id, &envelope).await?;
        info!("Queued test delivery {} for webhook {}", envelope.id, id);

        Ok(TestDelivery {
            subscription_id: id,
            event,
            envelope,
        })
    }

    async fn ensure_url_free(&self, url: &str, except: Option<Uuid>) -> Result<(), AppError> {
        let filter = WebhookFilter {
            url: Some(url.to_string()),
            ..Default::default()
        };

        let taken = self.store.find_webhooks(&filter).await?
            .into_iter()
            .any(|existing| Some(existing.id) != except);

        if taken {
            return Err(AppError::Conflict(format!("A webhook for {} already exists", url)));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        return Err(AppError::InvalidArgument(format!(
            "Name must be at least {} characters",
            MIN_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), AppError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| AppError::InvalidArgument(format!("Invalid URL: {}", url)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AppError::InvalidArgument(format!("URL must be http(s): {}", url)));
    }
    Ok(())
}

fn parse_events(raw: &[String]) -> Result<Vec<WebhookEventType>, AppError> {
    if raw.is_empty() {
        return Err(AppError::InvalidArgument("At least one event must be specified".to_string()));
    }

    let mut events = Vec::with_capacity(raw.len());
    for name in raw {
        let event: WebhookEventType = name.parse()?;
        if !events.contains(&event) {
            events.push(event);
        }
    }
    Ok(events)
}
