use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Cancel,
    Reschedule,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub user_id: Uuid,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn appointment(
        user_id: Uuid,
        action: AuditAction,
        appointment_id: Uuid,
        details: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            action,
            entity_type: "appointment".to_string(),
            entity_id: appointment_id,
            details: details.into(),
            created_at: at,
        }
    }
}
