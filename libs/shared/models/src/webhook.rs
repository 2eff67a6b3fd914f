use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Domain events that subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "appointment.created")]
    AppointmentCreated,
    #[serde(rename = "appointment.updated")]
    AppointmentUpdated,
    #[serde(rename = "appointment.cancelled")]
    AppointmentCancelled,
    #[serde(rename = "appointment.completed")]
    AppointmentCompleted,
    #[serde(rename = "appointment.rescheduled")]
    AppointmentRescheduled,
    #[serde(rename = "client.created")]
    ClientCreated,
    #[serde(rename = "specialist.created")]
    SpecialistCreated,
}

impl WebhookEventType {
    pub const ALL: [WebhookEventType; 7] = [
        WebhookEventType::AppointmentCreated,
        WebhookEventType::AppointmentUpdated,
        WebhookEventType::AppointmentCancelled,
        WebhookEventType::AppointmentCompleted,
        WebhookEventType::AppointmentRescheduled,
        WebhookEventType::ClientCreated,
        WebhookEventType::SpecialistCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppointmentCreated => "appointment.created",
            Self::AppointmentUpdated => "appointment.updated",
            Self::AppointmentCancelled => "appointment.cancelled",
            Self::AppointmentCompleted => "appointment.completed",
            Self::AppointmentRescheduled => "appointment.rescheduled",
            Self::ClientCreated => "client.created",
            Self::SpecialistCreated => "specialist.created",
        }
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WebhookEventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WebhookEventType::ALL
            .iter()
            .find(|event| event.as_str() == s)
            .copied()
            .ok_or_else(|| AppError::InvalidArgument(format!("Unknown webhook event: {}", s)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<WebhookEventType>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    pub fn subscribes_to(&self, event: WebhookEventType) -> bool {
        self.events.contains(&event)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWebhookSubscription {
    pub name: String,
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<WebhookEventType>,
    pub created_by: Uuid,
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<WebhookEventType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl WebhookUpdate {
    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Default::default()
        }
    }
}

/// Filter for subscription lookups.
#[derive(Debug, Clone, Default)]
pub struct WebhookFilter {
    pub active_only: bool,
    pub event: Option<WebhookEventType>,
    pub url: Option<String>,
}

impl WebhookFilter {
    pub fn active_for(event: WebhookEventType) -> Self {
        Self {
            active_only: true,
            event: Some(event),
            url: None,
        }
    }

    pub fn matches(&self, subscription: &WebhookSubscription) -> bool {
        (!self.active_only || subscription.is_active)
            && self.event.map_or(true, |event| subscription.subscribes_to(event))
            && self.url.as_ref().map_or(true, |url| &subscription.url == url)
    }
}

/// The signed, timestamped wrapper sent to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookEnvelope {
    pub id: Uuid,
    pub event: WebhookEventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    pub fn new(event: WebhookEventType, timestamp: DateTime<Utc>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            timestamp,
            data,
        }
    }
}
