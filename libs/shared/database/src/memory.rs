use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::{
    AppError, Appointment, AppointmentFilter, AppointmentStatus, AuditEntry, Client,
    NewAppointment, NewWebhookSubscription, Specialist, WebhookFilter, WebhookSubscription,
    WebhookUpdate, WeeklyAvailability,
};

use crate::store::BookingStore;

#[derive(Default)]
struct Tables {
    appointments: HashMap<Uuid, Appointment>,
    specialists: HashMap<Uuid, Specialist>,
    clients: HashMap<Uuid, Client>,
    webhooks: Vec<WebhookSubscription>,
    audit_log: Vec<AuditEntry>,
}

/// Process-local `BookingStore`, used when no Supabase project is configured
/// and throughout the test suites.
///
/// Enforces the same one-active-appointment-per-slot rule as the database's
/// partial unique index.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_specialist(&self, specialist: Specialist) {
        self.tables.write().await.specialists.insert(specialist.id, specialist);
    }

    pub async fn insert_client(&self, client: Client) {
        self.tables.write().await.clients.insert(client.id, client);
    }

    pub async fn insert_webhook(&self, webhook: WebhookSubscription) {
        self.tables.write().await.webhooks.push(webhook);
    }

    /// Seeds a row as-is, bypassing the slot check.
    pub async fn insert_appointment(&self, appointment: Appointment) {
        self.tables.write().await.appointments.insert(appointment.id, appointment);
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables.read().await.audit_log.clone()
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn find_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Appointment> = tables.appointments.values()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect();
        rows.sort_by_key(|appointment| (appointment.date, appointment.time, appointment.created_at));
        Ok(rows)
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, AppError> {
        let mut tables = self.tables.write().await;

        if appointment.status.is_active() {
            let taken = tables.appointments.values().any(|existing| {
                existing.specialist_id == appointment.specialist_id
                    && existing.date == appointment.date
                    && existing.time == appointment.time
                    && existing.is_active()
            });
            if taken {
                return Err(AppError::Conflict(format!(
                    "Specialist {} already has an appointment on {} at {}",
                    appointment.specialist_id, appointment.date, appointment.time
                )));
            }
        }

        let now = Utc::now();
        let row = Appointment {
            id: Uuid::new_v4(),
            client_id: appointment.client_id,
            specialist_id: appointment.specialist_id,
            scheduled_by_id: appointment.scheduled_by_id,
            date: appointment.date,
            time: appointment.time,
            status: appointment.status,
            rescheduled_from: appointment.rescheduled_from,
            created_at: now,
            updated_at: now,
        };
        tables.appointments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppError> {
        let mut tables = self.tables.write().await;
        let row = tables.appointments.get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", id)))?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn find_specialist(&self, id: Uuid) -> Result<Option<Specialist>, AppError> {
        Ok(self.tables.read().await.specialists.get(&id).cloned())
    }

    async fn update_specialist_availability(
        &self,
        id: Uuid,
        availability: &WeeklyAvailability,
    ) -> Result<Specialist, AppError> {
        let mut tables = self.tables.write().await;
        let row = tables.specialists.get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Specialist {} not found", id)))?;
        row.availability = availability.clone();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self.tables.read().await.clients.get(&id).cloned())
    }

    async fn find_webhooks(&self, filter: &WebhookFilter) -> Result<Vec<WebhookSubscription>, AppError> {
        Ok(self.tables.read().await.webhooks.iter()
            .filter(|webhook| filter.matches(webhook))
            .cloned()
            .collect())
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookSubscription>, AppError> {
        Ok(self.tables.read().await.webhooks.iter()
            .find(|webhook| webhook.id == id)
            .cloned())
    }

    async fn create_webhook(&self, webhook: &NewWebhookSubscription) -> Result<WebhookSubscription, AppError> {
        let mut tables = self.tables.write().await;
        if tables.webhooks.iter().any(|existing| existing.url == webhook.url) {
            return Err(AppError::Conflict(format!("Webhook for {} already exists", webhook.url)));
        }

        let now = Utc::now();
        let row = WebhookSubscription {
            id: Uuid::new_v4(),
            name: webhook.name.clone(),
            url: webhook.url.clone(),
            secret: webhook.secret.clone(),
            events: webhook.events.clone(),
            is_active: true,
            created_by: webhook.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.webhooks.push(row.clone());
        Ok(row)
    }

    async fn update_webhook(&self, id: Uuid, update: &WebhookUpdate) -> Result<WebhookSubscription, AppError> {
        let mut tables = self.tables.write().await;
        let row = tables.webhooks.iter_mut()
            .find(|webhook| webhook.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Webhook {} not found", id)))?;

        if let Some(name) = &update.name {
            row.name = name.clone();
        }
        if let Some(url) = &update.url {
            row.url = url.clone();
        }
        if let Some(secret) = &update.secret {
            row.secret = Some(secret.clone());
        }
        if let Some(events) = &update.events {
            row.events = events.clone();
        }
        if let Some(is_active) = update.is_active {
            row.is_active = is_active;
        }
        row.updated_at = Utc::now();

        Ok(row.clone())
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), AppError> {
        self.tables.write().await.audit_log.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared_models::TimeOfDay;

    fn booking(specialist_id: Uuid, status: AppointmentStatus) -> NewAppointment {
        NewAppointment {
            client_id: Uuid::new_v4(),
            specialist_id,
            scheduled_by_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            time: TimeOfDay::new(9, 0).unwrap(),
            status,
            rescheduled_from: None,
        }
    }

    #[tokio::test]
    async fn second_active_booking_for_slot_conflicts() {
        let store = InMemoryStore::new();
        let specialist_id = Uuid::new_v4();

        store.create_appointment(&booking(specialist_id, AppointmentStatus::Pending)).await.unwrap();
        let second = store.create_appointment(&booking(specialist_id, AppointmentStatus::Pending)).await;

        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn released_slot_can_be_booked_again() {
        let store = InMemoryStore::new();
        let specialist_id = Uuid::new_v4();

        let first = store.create_appointment(&booking(specialist_id, AppointmentStatus::Pending)).await.unwrap();
        store.update_appointment_status(first.id, AppointmentStatus::Cancelled).await.unwrap();

        assert!(store.create_appointment(&booking(specialist_id, AppointmentStatus::Pending)).await.is_ok());
    }

    #[tokio::test]
    async fn status_update_on_missing_row_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.update_appointment_status(Uuid::new_v4(), AppointmentStatus::Confirmed).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
