use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{WebhookEnvelope, WebhookEventType};

/// Subscription fields as submitted by an administrator; event names are raw strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWebhookRequest {
    pub name: String,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// What `send_test` queued for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDelivery {
    pub subscription_id: Uuid,
    pub event: WebhookEventType,
    pub envelope: WebhookEnvelope,
}
