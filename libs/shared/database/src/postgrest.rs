use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    AppError, Appointment, AppointmentFilter, AppointmentStatus, AuditEntry, Client,
    NewAppointment, NewWebhookSubscription, Specialist, WebhookFilter, WebhookSubscription,
    WebhookUpdate, WeeklyAvailability,
};

use crate::store::BookingStore;
use crate::supabase::SupabaseClient;

/// `BookingStore` backed by the Supabase PostgREST API.
pub struct SupabaseStore {
    supabase: SupabaseClient,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, AppError> {
        let result: Vec<Value> = self.supabase.request(Method::GET, path, None).await?;

        let rows = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;

        Ok(rows)
    }

    async fn select_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AppError> {
        Ok(self.select(path).await?.into_iter().next())
    }

    async fn write_one<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
        missing: impl FnOnce() -> AppError,
    ) -> Result<T, AppError> {
        let result: Vec<Value> = self.supabase.request_with_headers(
            method,
            path,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let row = result.into_iter().next().ok_or_else(missing)?;
        Ok(serde_json::from_value(row)?)
    }
}

fn appointment_query(filter: &AppointmentFilter) -> String {
    let mut query_parts = Vec::new();

    if let Some(client_id) = filter.client_id {
        query_parts.push(format!("client_id=eq.{}", client_id));
    }
    if let Some(specialist_id) = filter.specialist_id {
        query_parts.push(format!("specialist_id=eq.{}", specialist_id));
    }
    if let Some(date) = filter.date {
        query_parts.push(format!("date=eq.{}", date.format("%Y-%m-%d")));
    }
    if let Some(statuses) = &filter.statuses {
        let names: Vec<&str> = statuses.iter().map(AppointmentStatus::as_str).collect();
        query_parts.push(format!("status=in.({})", names.join(",")));
    }

    query_parts.push("order=date.asc,time.asc".to_string());
    format!("/rest/v1/appointments?{}", query_parts.join("&"))
}

fn webhook_query(filter: &WebhookFilter) -> String {
    let mut query_parts = Vec::new();

    if filter.active_only {
        query_parts.push("is_active=eq.true".to_string());
    }
    if let Some(event) = filter.event {
        query_parts.push(format!("events=cs.{{{}}}", event.as_str()));
    }
    if let Some(url) = &filter.url {
        query_parts.push(format!("url=eq.{}", urlencoding::encode(url)));
    }

    query_parts.push("order=created_at.asc".to_string());
    format!("/rest/v1/webhooks?{}", query_parts.join("&"))
}

#[async_trait]
impl BookingStore for SupabaseStore {
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        self.select_one(&format!("/rest/v1/appointments?id=eq.{}", id)).await
    }

    async fn find_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppError> {
        let path = appointment_query(filter);
        debug!("Fetching appointments: {}", path);
        self.select(&path).await
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, AppError> {
        let body = serde_json::to_value(appointment)?;
        self.write_one(Method::POST, "/rest/v1/appointments", body, || {
            AppError::Transient("Insert returned no appointment".to_string())
        }).await
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppError> {
        let body = json!({
            "status": status,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.write_one(Method::PATCH, &format!("/rest/v1/appointments?id=eq.{}", id), body, || {
            AppError::NotFound(format!("Appointment {} not found", id))
        }).await
    }

    async fn find_specialist(&self, id: Uuid) -> Result<Option<Specialist>, AppError> {
        self.select_one(&format!("/rest/v1/specialists?id=eq.{}", id)).await
    }

    async fn update_specialist_availability(
        &self,
        id: Uuid,
        availability: &WeeklyAvailability,
    ) -> Result<Specialist, AppError> {
        let body = json!({
            "availability": availability,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.write_one(Method::PATCH, &format!("/rest/v1/specialists?id=eq.{}", id), body, || {
            AppError::NotFound(format!("Specialist {} not found", id))
        }).await
    }

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        self.select_one(&format!("/rest/v1/clients?id=eq.{}", id)).await
    }

    async fn find_webhooks(&self, filter: &WebhookFilter) -> Result<Vec<WebhookSubscription>, AppError> {
        self.select(&webhook_query(filter)).await
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookSubscription>, AppError> {
        self.select_one(&format!("/rest/v1/webhooks?id=eq.{}", id)).await
    }

    async fn create_webhook(&self, webhook: &NewWebhookSubscription) -> Result<WebhookSubscription, AppError> {
        let mut body = serde_json::to_value(webhook)?;
        body["is_active"] = json!(true);
        self.write_one(Method::POST, "/rest/v1/webhooks", body, || {
            AppError::Transient("Insert returned no webhook".to_string())
        }).await
    }

    async fn update_webhook(&self, id: Uuid, update: &WebhookUpdate) -> Result<WebhookSubscription, AppError> {
        let mut body = serde_json::to_value(update)?;
        body["updated_at"] = json!(Utc::now().to_rfc3339());
        self.write_one(Method::PATCH, &format!("/rest/v1/webhooks?id=eq.{}", id), body, || {
            AppError::NotFound(format!("Webhook {} not found", id))
        }).await
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), AppError> {
        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/audit_logs",
            Some(serde_json::to_value(entry)?),
            Some(SupabaseClient::representation_headers()),
        ).await?;
        Ok(())
    }
}
