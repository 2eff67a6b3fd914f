use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use job_queue_cell::JobScheduler;
use shared_database::BookingStore;
use shared_models::{AppError, WebhookEnvelope, WebhookEventType, WebhookFilter};
use shared_utils::{BestEffort, Clock, ErrorSink};

/// Fans a domain event out to every active subscriber as one delivery job each.
pub struct WebhookDispatcher {
    store: Arc<dyn BookingStore>,
    scheduler: Arc<JobScheduler>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ErrorSink>,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn BookingStore>,
        scheduler: Arc<JobScheduler>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self { store, scheduler, clock, sink }
    }

    /// Returns the envelope that was queued, or `None` when nobody subscribes.
    ///
    /// A subscriber whose job cannot be queued is recorded and skipped; the
    /// others still receive the event.
    pub async fn dispatch(
        &self,
        event: WebhookEventType,
        data: Value,
    ) -> Result<Option<WebhookEnvelope>, AppError> {
        let subscriptions = self.store.find_webhooks(&WebhookFilter::active_for(event)).await?;
        if subscriptions.is_empty() {
            debug!("No active webhooks for {}", event);
            return Ok(None);
        }

        let envelope = WebhookEnvelope::new(event, self.clock.now(), data);
        let mut queued = 0;

        for subscription in &subscriptions {
            let enqueued = self
                .scheduler
                .enqueue_webhook_delivery(subscription.id, &envelope)
                .await
                .or_record(self.sink.as_ref(), "enqueue webhook delivery");

            if enqueued.is_some() {
                queued += 1;
                debug!("Event {} queued for webhook {}", event, subscription.id);
            }
        }

        info!("Dispatched {} to {}/{} webhooks", event, queued, subscriptions.len());
        Ok(Some(envelope))
    }
}
