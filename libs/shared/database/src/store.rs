use async_trait::async_trait;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, AuditEntry, Client, NewAppointment,
    NewWebhookSubscription, Specialist, WebhookFilter, WebhookSubscription, WebhookUpdate,
    WeeklyAvailability, AppError,
};

/// Persistent record store shared by every cell.
///
/// Lookups return `Ok(None)` for a missing row; writes against a missing row
/// return `AppError::NotFound`. Inserting an active appointment into a slot
/// that already holds one returns `AppError::Conflict`.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError>;

    /// Matching appointments ordered by date, then time, ascending.
    async fn find_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppError>;

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, AppError>;

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppError>;

    async fn find_specialist(&self, id: Uuid) -> Result<Option<Specialist>, AppError>;

    async fn update_specialist_availability(
        &self,
        id: Uuid,
        availability: &WeeklyAvailability,
    ) -> Result<Specialist, AppError>;

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>, AppError>;

    async fn find_webhooks(&self, filter: &WebhookFilter) -> Result<Vec<WebhookSubscription>, AppError>;

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookSubscription>, AppError>;

    async fn create_webhook(&self, webhook: &NewWebhookSubscription) -> Result<WebhookSubscription, AppError>;

    async fn update_webhook(&self, id: Uuid, update: &WebhookUpdate) -> Result<WebhookSubscription, AppError>;

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), AppError>;
}
