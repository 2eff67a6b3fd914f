// libs/appointment-cell/src/models.rs
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::TimeOfDay;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub client_id: Uuid,
    pub specialist_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: NaiveDate,
    pub new_time: TimeOfDay,
}

// ==============================================================================
// LIFECYCLE RULES
// ==============================================================================

/// Business rules for appointment lifecycle management
#[derive(Debug, Clone)]
pub struct AppointmentLifecycleRules {
    pub min_cancellation_notice: Duration,
}

impl Default for AppointmentLifecycleRules {
    fn default() -> Self {
        Self {
            min_cancellation_notice: Duration::hours(6),
        }
    }
}
