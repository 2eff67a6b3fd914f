use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::*;
use job_queue_cell::*;
use shared_database::{BookingStore, InMemoryStore};
use shared_models::{
    AppError, Appointment, AppointmentFilter, AppointmentStatus, AuditAction, AuditEntry, Client,
    NewAppointment, NewWebhookSubscription, Specialist, WebhookEventType, WebhookFilter,
    WebhookSubscription, WebhookUpdate, WeeklyAvailability,
};
use shared_utils::test_utils::{monday_morning, next_monday, slot, test_client, TestConfig, TestSpecialist};
use shared_utils::{Clock, ManualClock, TracingErrorSink};
use webhook_cell::WebhookDispatcher;

/// Delegates to the in-memory store but can be told to refuse new appointments.
struct RejectingInserts {
    inner: Arc<InMemoryStore>,
    reject: AtomicBool,
}

#[async_trait]
impl BookingStore for RejectingInserts {
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        self.inner.find_appointment(id).await
    }

    async fn find_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppError> {
        self.inner.find_appointments(filter).await
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, AppError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(AppError::Transient("Supabase returned 503".to_string()));
        }
        self.inner.create_appointment(appointment).await
    }

    async fn update_appointment_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment, AppError> {
        self.inner.update_appointment_status(id, status).await
    }

    async fn find_specialist(&self, id: Uuid) -> Result<Option<Specialist>, AppError> {
        self.inner.find_specialist(id).await
    }

    async fn update_specialist_availability(
        &self,
        id: Uuid,
        availability: &WeeklyAvailability,
    ) -> Result<Specialist, AppError> {
        self.inner.update_specialist_availability(id, availability).await
    }

    async fn find_client(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        self.inner.find_client(id).await
    }

    async fn find_webhooks(&self, filter: &WebhookFilter) -> Result<Vec<WebhookSubscription>, AppError> {
        self.inner.find_webhooks(filter).await
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookSubscription>, AppError> {
        self.inner.find_webhook(id).await
    }

    async fn create_webhook(&self, webhook: &NewWebhookSubscription) -> Result<WebhookSubscription, AppError> {
        self.inner.create_webhook(webhook).await
    }

    async fn update_webhook(&self, id: Uuid, update: &WebhookUpdate) -> Result<WebhookSubscription, AppError> {
        self.inner.update_webhook(id, update).await
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<(), AppError> {
        self.inner.record_audit(entry).await
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    jobs: Arc<InMemoryJobStore>,
    clock: ManualClock,
    service: Arc<AppointmentService>,
    client: Client,
    specialist: Specialist,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    harness_over(store.clone(), store).await
}

/// Harness whose service talks to `booking`, which must front `store`.
async fn harness_over(store: Arc<InMemoryStore>, booking: Arc<dyn BookingStore>) -> Harness {
    let jobs = Arc::new(InMemoryJobStore::default());
    let clock = ManualClock::new(monday_morning());
    let scheduler = Arc::new(JobScheduler::new(jobs.clone(), TestConfig::default().to_arc(), Arc::new(clock.clone())));
    let dispatcher = Arc::new(WebhookDispatcher::new(
        booking.clone(),
        scheduler.clone(),
        Arc::new(clock.clone()),
        Arc::new(TracingErrorSink),
    ));

    let client = test_client();
    let specialist = TestSpecialist::default().build();
    store.insert_client(client.clone()).await;
    store.insert_specialist(specialist.clone()).await;
    store.insert_webhook(WebhookSubscription {
        id: Uuid::new_v4(),
        name: "audit mirror".to_string(),
        url: "https://hooks.example.com/agenda".to_string(),
        secret: Some("whsec_test".to_string()),
        events: WebhookEventType::ALL.to_vec(),
        is_active: true,
        created_by: Uuid::new_v4(),
        created_at: monday_morning(),
        updated_at: monday_morning(),
    }).await;

    let service = Arc::new(AppointmentService::new(
        booking,
        scheduler,
        dispatcher,
        Arc::new(clock.clone()),
        Arc::new(TracingErrorSink),
    ));

    Harness { store, jobs, clock, service, client, specialist }
}

impl Harness {
    fn request(&self, date: NaiveDate, time: &str) -> BookAppointmentRequest {
        BookAppointmentRequest {
            client_id: self.client.id,
            specialist_id: self.specialist.id,
            date,
            time: slot(time),
        }
    }

    async fn book(&self, time: &str) -> Appointment {
        self.service.create(self.request(next_monday(), time), self.client.user_id).await.unwrap()
    }

    async fn job(&self, queue: QueueName, key: &str) -> Option<Job> {
        self.jobs.get(queue, key).await.unwrap()
    }

    async fn keys_with_prefix(&self, queue: QueueName, prefix: &str) -> Vec<String> {
        self.jobs
            .live_keys(queue)
            .await
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect()
    }

    /// Webhook envelopes queued so far, as (event, appointment id in the payload).
    async fn emitted(&self) -> Vec<(WebhookEventType, String)> {
        let mut events = Vec::new();
        for key in self.jobs.live_keys(QueueName::Webhooks).await {
            if let Some(Job { payload: JobPayload::WebhookDelivery { envelope, .. }, .. }) = self.job(QueueName::Webhooks, &key).await {
                let id = envelope.data["id"].as_str().unwrap_or_default().to_string();
                events.push((envelope.event, id));
            }
        }
        events
    }
}

#[tokio::test]
async fn test_create_books_pending_and_arms_jobs() {
    let h = harness().await;

    let appointment = h.book("09:00").await;

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.scheduled_by_id, h.client.user_id);
    assert_eq!(appointment.rescheduled_from, None);

    let starts = Utc.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap();
    let reminder = h.job(QueueName::Reminders, &reminder_key(appointment.id)).await.unwrap();
    assert_eq!(reminder.not_before, starts - Duration::hours(24));
    let expiration = h.job(QueueName::Expirations, &expiration_key(appointment.id)).await.unwrap();
    assert_eq!(expiration.not_before, starts + Duration::minutes(30));

    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Create);
    assert_eq!(audit[0].entity_id, appointment.id);

    assert_eq!(h.emitted().await, vec![(WebhookEventType::AppointmentCreated, appointment.id.to_string())]);
}

#[tokio::test]
async fn test_create_rejects_unknown_parties_and_taken_slots() {
    let h = harness().await;

    let unknown_client = BookAppointmentRequest { client_id: Uuid::new_v4(), ..h.request(next_monday(), "09:00") };
    assert_matches!(h.service.create(unknown_client, Uuid::new_v4()).await, Err(AppError::NotFound(_)));

    let unknown_specialist = BookAppointmentRequest { specialist_id: Uuid::new_v4(), ..h.request(next_monday(), "09:00") };
    assert_matches!(h.service.create(unknown_specialist, Uuid::new_v4()).await, Err(AppError::NotFound(_)));

    h.book("09:00").await;
    assert_matches!(
        h.service.create(h.request(next_monday(), "09:00"), Uuid::new_v4()).await,
        Err(AppError::Conflict(_))
    );

    // Not a declared slot
    assert_matches!(
        h.service.create(h.request(next_monday(), "09:30"), Uuid::new_v4()).await,
        Err(AppError::Conflict(_))
    );

    assert_eq!(h.service.list_by_specialist(h.specialist.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_bookings_for_one_slot_have_one_winner() {
    let h = harness().await;

    let attempts = (0..5).map(|_| {
        let service = h.service.clone();
        let request = h.request(next_monday(), "10:00");
        tokio::spawn(async move { service.create(request, Uuid::new_v4()).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppError::Conflict(_))));
}

#[tokio::test]
async fn test_cancellation_needs_six_hours_notice() {
    let h = harness().await;
    let appointment = h.book("09:00").await;
    let starts = appointment.scheduled_at_utc();

    h.clock.set(starts - Duration::hours(6) + Duration::minutes(1));
    assert_matches!(
        h.service.update_status(appointment.id, "cancelled", Uuid::new_v4()).await,
        Err(AppError::PolicyViolation(_))
    );
    assert_eq!(h.service.get(appointment.id).await.unwrap().status, AppointmentStatus::Pending);
    assert!(h.job(QueueName::Reminders, &reminder_key(appointment.id)).await.is_some());

    h.clock.set(starts - Duration::hours(6));
    let cancelled = h.service.update_status(appointment.id, "cancelled", Uuid::new_v4()).await.unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(h.job(QueueName::Reminders, &reminder_key(appointment.id)).await.is_none());
    assert!(h.job(QueueName::Expirations, &expiration_key(appointment.id)).await.is_none());
    assert_eq!(
        h.keys_with_prefix(QueueName::Reminders, "cancellation-").await,
        vec![format!("cancellation-{}-{}", appointment.id, h.clock.now().timestamp_millis())]
    );
    assert!(h.emitted().await.contains(&(WebhookEventType::AppointmentCancelled, appointment.id.to_string())));
    assert_eq!(h.store.audit_entries().await.last().unwrap().action, AuditAction::Cancel);
}

#[tokio::test]
async fn test_confirmation_queues_notification_and_update_event() {
    let h = harness().await;
    let appointment = h.book("09:00").await;

    let confirmed = h.service.update_status(appointment.id, "confirmed", Uuid::new_v4()).await.unwrap();

    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(
        h.keys_with_prefix(QueueName::Reminders, "confirmation-").await,
        vec![format!("confirmation-{}-{}", appointment.id, monday_morning().timestamp_millis())]
    );
    assert!(h.emitted().await.contains(&(WebhookEventType::AppointmentUpdated, appointment.id.to_string())));
    // Confirming leaves the reminder in place
    assert!(h.job(QueueName::Reminders, &reminder_key(appointment.id)).await.is_some());
}

#[tokio::test]
async fn test_completion_emits_completed_and_freezes_the_row() {
    let h = harness().await;
    let appointment = h.book("09:00").await;

    h.service.update_status(appointment.id, "completed", Uuid::new_v4()).await.unwrap();
    assert!(h.emitted().await.contains(&(WebhookEventType::AppointmentCompleted, appointment.id.to_string())));

    assert_matches!(
        h.service.update_status(appointment.id, "confirmed", Uuid::new_v4()).await,
        Err(AppError::PolicyViolation(_))
    );
    assert_eq!(h.service.get(appointment.id).await.unwrap().status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn test_update_status_rejects_unknown_status_and_missing_rows() {
    let h = harness().await;
    let appointment = h.book("09:00").await;

    assert_matches!(
        h.service.update_status(appointment.id, "no_show", Uuid::new_v4()).await,
        Err(AppError::InvalidArgument(_))
    );
    assert_matches!(
        h.service.update_status(Uuid::new_v4(), "confirmed", Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    );
}

#[tokio::test]
async fn test_reschedule_links_rows_and_moves_jobs() {
    let h = harness().await;
    let previous = h.book("09:00").await;
    let actor = Uuid::new_v4();

    let replacement = h.service
        .reschedule(previous.id, RescheduleAppointmentRequest { new_date: next_monday(), new_time: slot("10:00") }, actor)
        .await
        .unwrap();

    assert_ne!(replacement.id, previous.id);
    assert_eq!(replacement.status, AppointmentStatus::Pending);
    assert_eq!(replacement.rescheduled_from, Some(previous.id));
    assert_eq!(replacement.client_id, previous.client_id);
    assert_eq!(replacement.specialist_id, previous.specialist_id);
    assert_eq!(replacement.scheduled_by_id, actor);
    assert_eq!(h.service.get(previous.id).await.unwrap().status, AppointmentStatus::Rescheduled);

    assert!(h.job(QueueName::Reminders, &reminder_key(previous.id)).await.is_none());
    assert!(h.job(QueueName::Expirations, &expiration_key(previous.id)).await.is_none());
    assert!(h.job(QueueName::Reminders, &reminder_key(replacement.id)).await.is_some());
    assert!(h.job(QueueName::Expirations, &expiration_key(replacement.id)).await.is_some());

    assert!(h.emitted().await.contains(&(WebhookEventType::AppointmentRescheduled, replacement.id.to_string())));
    assert_eq!(h.store.audit_entries().await.last().unwrap().action, AuditAction::Reschedule);

    // The old slot is free again
    h.book("09:00").await;
}

#[tokio::test]
async fn test_reschedule_into_taken_slot_changes_nothing() {
    let h = harness().await;
    let first = h.book("09:00").await;
    h.book("10:00").await;

    assert_matches!(
        h.service
            .reschedule(first.id, RescheduleAppointmentRequest { new_date: next_monday(), new_time: slot("10:00") }, Uuid::new_v4())
            .await,
        Err(AppError::Conflict(_))
    );
    assert_eq!(h.service.get(first.id).await.unwrap().status, AppointmentStatus::Pending);
    assert!(h.job(QueueName::Reminders, &reminder_key(first.id)).await.is_some());

    assert_matches!(
        h.service
            .reschedule(Uuid::new_v4(), RescheduleAppointmentRequest { new_date: next_monday(), new_time: slot("10:00") }, Uuid::new_v4())
            .await,
        Err(AppError::NotFound(_))
    );
}

#[tokio::test]
async fn test_lists_are_ordered_by_date_then_time() {
    let h = harness().await;
    let following_monday = next_monday() + Duration::days(7);

    let late = h.book("10:00").await;
    let next_week = h.service.create(h.request(following_monday, "09:00"), Uuid::new_v4()).await.unwrap();
    let early = h.book("09:00").await;

    let ids: Vec<Uuid> = h.service.list_by_client(h.client.id).await.unwrap().iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![early.id, late.id, next_week.id]);

    assert!(h.service.list_by_client(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_replacement_insert_keeps_the_existing_booking() {
    let store = Arc::new(InMemoryStore::new());
    let flaky = Arc::new(RejectingInserts { inner: store.clone(), reject: AtomicBool::new(false) });
    let h = harness_over(store, flaky.clone()).await;
    let booked = h.book("09:00").await;

    flaky.reject.store(true, Ordering::SeqCst);
    assert_matches!(
        h.service
            .reschedule(booked.id, RescheduleAppointmentRequest { new_date: next_monday(), new_time: slot("10:00") }, Uuid::new_v4())
            .await,
        Err(AppError::Transient(_))
    );

    assert_eq!(h.service.get(booked.id).await.unwrap().status, AppointmentStatus::Pending);
    assert_eq!(h.service.list_by_specialist(h.specialist.id).await.unwrap().len(), 1);
    assert!(h.job(QueueName::Reminders, &reminder_key(booked.id)).await.is_some());
    assert!(h.job(QueueName::Expirations, &expiration_key(booked.id)).await.is_some());
    assert!(!h.emitted().await.iter().any(|(event, _)| *event == WebhookEventType::AppointmentRescheduled));

    // Works once the store recovers
    flaky.reject.store(false, Ordering::SeqCst);
    let replacement = h.service
        .reschedule(booked.id, RescheduleAppointmentRequest { new_date: next_monday(), new_time: slot("10:00") }, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(replacement.rescheduled_from, Some(booked.id));
}

#[tokio::test]
async fn test_status_update_to_rescheduled_emits_plain_update() {
    let h = harness().await;
    let appointment = h.book("09:00").await;

    let updated = h.service.update_status(appointment.id, "rescheduled", Uuid::new_v4()).await.unwrap();
    assert_eq!(updated.status, AppointmentStatus::Rescheduled);

    let events = h.emitted().await;
    assert!(events.contains(&(WebhookEventType::AppointmentUpdated, appointment.id.to_string())));
    assert!(!events.iter().any(|(event, _)| *event == WebhookEventType::AppointmentRescheduled));
}
