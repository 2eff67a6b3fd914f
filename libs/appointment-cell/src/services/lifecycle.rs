// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use shared_models::{AppError, Appointment, AppointmentStatus, AuditAction, WebhookEventType};

use crate::models::AppointmentLifecycleRules;

pub struct AppointmentLifecycleService {
    rules: AppointmentLifecycleRules,
}

impl AppointmentLifecycleService {
    pub fn new(rules: AppointmentLifecycleRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &AppointmentLifecycleRules {
        &self.rules
    }

    /// Terminal rows are history; nothing moves them again.
    pub fn validate_status_transition(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
    ) -> Result<(), AppError> {
        debug!("Validating status transition from {} to {}", appointment.status, new_status);

        if appointment.status.is_terminal() {
            warn!(
                "Rejected transition of appointment {} from terminal status {} to {}",
                appointment.id, appointment.status, new_status
            );
            return Err(AppError::PolicyViolation(format!(
                "Appointment {} is already {}",
                appointment.id, appointment.status
            )));
        }

        Ok(())
    }

    /// Cancelling needs at least the configured notice before the scheduled start.
    pub fn validate_cancellation_timing(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let notice = appointment.scheduled_at_utc() - now;

        if notice < self.rules.min_cancellation_notice {
            return Err(AppError::PolicyViolation(format!(
                "Appointments can only be cancelled at least {} hours in advance",
                self.rules.min_cancellation_notice.num_hours()
            )));
        }

        Ok(())
    }

    pub fn event_for(&self, status: AppointmentStatus) -> WebhookEventType {
        match status {
            AppointmentStatus::Cancelled => WebhookEventType::AppointmentCancelled,
            AppointmentStatus::Completed => WebhookEventType::AppointmentCompleted,
            _ => WebhookEventType::AppointmentUpdated,
        }
    }

    pub fn audit_action_for(&self, status: AppointmentStatus) -> AuditAction {
        match status {
            AppointmentStatus::Cancelled => AuditAction::Cancel,
            _ => AuditAction::Update,
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new(AppointmentLifecycleRules::default())
    }
}
