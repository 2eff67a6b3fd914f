// libs/shared/models/src/appointment.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::time::TimeOfDay;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub specialist_id: Uuid,
    pub scheduled_by_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub status: AppointmentStatus,
    #[serde(rename = "rescheduled_from_id")]
    pub rescheduled_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Date and time-of-day composed literally, with no timezone conversion.
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time.as_naive())
    }

    /// The scheduled moment read on the same clock as `Utc::now()`.
    pub fn scheduled_at_utc(&self) -> DateTime<Utc> {
        self.scheduled_at().and_utc()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Rescheduled,
    Expired,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
        AppointmentStatus::Rescheduled,
        AppointmentStatus::Expired,
    ];

    /// Statuses that still occupy the specialist's slot.
    pub const ACTIVE: [AppointmentStatus; 3] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
    ];

    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Rescheduled | AppointmentStatus::Expired
        )
    }

    /// Terminal rows are kept for history and never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| AppError::InvalidArgument(format!("Invalid status: {}", s)))
    }
}

// ==============================================================================
// STORE INPUT / QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub client_id: Uuid,
    pub specialist_id: Uuid,
    pub scheduled_by_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub status: AppointmentStatus,
    #[serde(rename = "rescheduled_from_id")]
    pub rescheduled_from: Option<Uuid>,
}

/// Predicate for appointment queries; unset fields match everything.
/// Results are ordered by date, then time, ascending.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub client_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub statuses: Option<Vec<AppointmentStatus>>,
}

impl AppointmentFilter {
    pub fn active_for(specialist_id: Uuid, date: NaiveDate) -> Self {
        Self {
            specialist_id: Some(specialist_id),
            date: Some(date),
            statuses: Some(AppointmentStatus::ACTIVE.to_vec()),
            ..Default::default()
        }
    }

    pub fn pending_on(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            statuses: Some(vec![AppointmentStatus::Pending]),
            ..Default::default()
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.client_id.map_or(true, |id| appointment.client_id == id)
            && self.specialist_id.map_or(true, |id| appointment.specialist_id == id)
            && self.date.map_or(true, |date| appointment.date == date)
            && self
                .statuses
                .as_ref()
                .map_or(true, |statuses| statuses.contains(&appointment.status))
    }
}
