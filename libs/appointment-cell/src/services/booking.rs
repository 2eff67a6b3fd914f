// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::AvailabilityService;
use job_queue_cell::{JobScheduler, NotificationKind};
use shared_database::BookingStore;
use shared_models::{
    AppError, Appointment, AppointmentFilter, AppointmentStatus, AuditAction, AuditEntry,
    NewAppointment, WebhookEventType,
};
use shared_utils::{BestEffort, Clock, ErrorSink};
use webhook_cell::WebhookDispatcher;

use crate::models::{AppointmentLifecycleRules, BookAppointmentRequest, RescheduleAppointmentRequest};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SpecialistLocks;

/// Appointment state machine: every transition reconciles the job pipeline
/// and notifies webhook subscribers.
pub struct AppointmentService {
    store: Arc<dyn BookingStore>,
    availability: AvailabilityService,
    scheduler: Arc<JobScheduler>,
    dispatcher: Arc<WebhookDispatcher>,
    lifecycle: AppointmentLifecycleService,
    locks: SpecialistLocks,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ErrorSink>,
}

impl AppointmentService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        scheduler: Arc<JobScheduler>,
        dispatcher: Arc<WebhookDispatcher>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self::with_rules(store, scheduler, dispatcher, clock, sink, AppointmentLifecycleRules::default())
    }

    pub fn with_rules(
        store: Arc<dyn BookingStore>,
        scheduler: Arc<JobScheduler>,
        dispatcher: Arc<WebhookDispatcher>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ErrorSink>,
        rules: AppointmentLifecycleRules,
    ) -> Self {
        Self {
            availability: AvailabilityService::new(store.clone()),
            store,
            scheduler,
            dispatcher,
            lifecycle: AppointmentLifecycleService::new(rules),
            locks: SpecialistLocks::new(),
            clock,
            sink,
        }
    }

    /// Books a PENDING appointment in a free slot and arms its reminder and expiration.
    pub async fn create(
        &self,
        request: BookAppointmentRequest,
        actor: Uuid,
    ) -> Result<Appointment, AppError> {
        info!(
            "Booking appointment for client {} with specialist {} on {} at {}",
            request.client_id, request.specialist_id, request.date, request.time
        );

        self.store
            .find_client(request.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Client {} not found", request.client_id)))?;

        let appointment = {
            let _guard = self.locks.acquire(request.specialist_id).await;

            // Also the existence check for the specialist
            if !self.availability.is_available(request.specialist_id, request.date, request.time).await? {
                warn!(
                    "Slot {} {} is not available for specialist {}",
                    request.date, request.time, request.specialist_id
                );
                return Err(AppError::Conflict(format!(
                    "Time slot {} {} is not available",
                    request.date, request.time
                )));
            }

            self.store.create_appointment(&NewAppointment {
                client_id: request.client_id,
                specialist_id: request.specialist_id,
                scheduled_by_id: actor,
                date: request.date,
                time: request.time,
                status: AppointmentStatus::Pending,
                rescheduled_from: None,
            }).await?
        };

        self.scheduler.schedule_reminder(&appointment).await?;

        self.audit(
            actor,
            AuditAction::Create,
            appointment.id,
            format!("Appointment booked for {} at {}", appointment.date, appointment.time),
        ).await;
        self.emit(WebhookEventType::AppointmentCreated, &appointment).await;

        info!("Appointment {} booked successfully", appointment.id);
        Ok(appointment)
    }

    /// Moves an appointment to `raw_status`, applying the per-status side effects.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        raw_status: &str,
        actor: Uuid,
    ) -> Result<Appointment, AppError> {
        debug!("Updating status of appointment {} to {}", appointment_id, raw_status);

        let current = self.get(appointment_id).await?;
        let new_status: AppointmentStatus = raw_status.parse()?;
        self.lifecycle.validate_status_transition(&current, new_status)?;

        match new_status {
            AppointmentStatus::Cancelled => {
                self.lifecycle.validate_cancellation_timing(&current, self.clock.now())?;

                self.scheduler
                    .cancel(appointment_id)
                    .await
                    .or_record(self.sink.as_ref(), "cancel appointment jobs");
                self.scheduler
                    .enqueue_notification(appointment_id, NotificationKind::Cancellation)
                    .await
                    .or_record(self.sink.as_ref(), "enqueue cancellation notification");
            }
            AppointmentStatus::Confirmed => {
                self.scheduler
                    .enqueue_notification(appointment_id, NotificationKind::Confirmation)
                    .await
                    .or_record(self.sink.as_ref(), "enqueue confirmation notification");
            }
            _ => {}
        }

        let updated = self.store.update_appointment_status(appointment_id, new_status).await?;

        self.audit(
            actor,
            self.lifecycle.audit_action_for(new_status),
            appointment_id,
            format!("Status changed from {} to {}", current.status, new_status),
        ).await;
        self.emit(self.lifecycle.event_for(new_status), &updated).await;

        info!("Appointment {} is now {}", appointment_id, new_status);
        Ok(updated)
    }

    /// Replaces an appointment with a new PENDING one for the same specialist.
    /// The old row is kept as RESCHEDULED and linked from the new one.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        actor: Uuid,
    ) -> Result<Appointment, AppError> {
        debug!("Rescheduling appointment: {}", appointment_id);

        let current = self.get(appointment_id).await?;
        self.lifecycle.validate_status_transition(&current, AppointmentStatus::Rescheduled)?;

        let replacement = {
            let _guard = self.locks.acquire(current.specialist_id).await;

            if !self.availability.is_available(current.specialist_id, request.new_date, request.new_time).await? {
                return Err(AppError::Conflict(format!(
                    "Time slot {} {} is not available",
                    request.new_date, request.new_time
                )));
            }

            self.store
                .update_appointment_status(appointment_id, AppointmentStatus::Rescheduled)
                .await?;

            let inserted = self.store.create_appointment(&NewAppointment {
                client_id: current.client_id,
                specialist_id: current.specialist_id,
                scheduled_by_id: actor,
                date: request.new_date,
                time: request.new_time,
                status: AppointmentStatus::Pending,
                rescheduled_from: Some(appointment_id),
            }).await;

            match inserted {
                Ok(replacement) => replacement,
                Err(e) => {
                    warn!("Reschedule of appointment {} failed, restoring it: {}", appointment_id, e);
                    self.store
                        .update_appointment_status(appointment_id, current.status)
                        .await
                        .or_record(self.sink.as_ref(), "restore appointment after failed reschedule");
                    return Err(e);
                }
            }
        };

        // Old jobs stay armed until the replacement exists
        self.scheduler
            .cancel(appointment_id)
            .await
            .or_record(self.sink.as_ref(), "cancel appointment jobs");
        self.scheduler.schedule_reminder(&replacement).await?;

        self.audit(
            actor,
            AuditAction::Reschedule,
            replacement.id,
            format!(
                "Rescheduled from {} {} to {} {} (previous appointment {})",
                current.date, current.time, replacement.date, replacement.time, appointment_id
            ),
        ).await;
        self.emit(WebhookEventType::AppointmentRescheduled, &replacement).await;

        info!("Appointment {} rescheduled as {}", appointment_id, replacement.id);
        Ok(replacement)
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppError> {
        self.store
            .find_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", appointment_id)))
    }

    pub async fn list_by_client(&self, client_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        self.store.find_appointments(&AppointmentFilter {
            client_id: Some(client_id),
            ..Default::default()
        }).await
    }

    pub async fn list_by_specialist(&self, specialist_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        self.store.find_appointments(&AppointmentFilter {
            specialist_id: Some(specialist_id),
            ..Default::default()
        }).await
    }

    async fn audit(&self, actor: Uuid, action: AuditAction, appointment_id: Uuid, details: String) {
        let entry = AuditEntry::appointment(actor, action, appointment_id, details, self.clock.now());
        self.store
            .record_audit(&entry)
            .await
            .or_record(self.sink.as_ref(), "record audit entry");
    }

    async fn emit(&self, event: WebhookEventType, appointment: &Appointment) {
        let Some(data) = serde_json::to_value(appointment).or_record(self.sink.as_ref(), "serialize appointment") else {
            return;
        };

        self.dispatcher
            .dispatch(event, data)
            .await
            .or_record(self.sink.as_ref(), "dispatch webhook event");
    }
}
