use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use job_queue_cell::{next_midnight, Job, JobOutcome, JobPayload, JobProcessor, NotificationKind, DAILY_CHECK_KEY};
use shared_database::BookingStore;
use shared_models::{AppError, Appointment, Client, Specialist};
use shared_utils::Clock;

use crate::services::daily::DailyReminderRunner;

/// Processor for the `reminders` queue: reminders, confirmation and
/// cancellation notices, and the daily sweep.
pub struct ReminderProcessor {
    store: Arc<dyn BookingStore>,
    daily: DailyReminderRunner,
    clock: Arc<dyn Clock>,
}

impl ReminderProcessor {
    pub fn new(store: Arc<dyn BookingStore>, daily: DailyReminderRunner, clock: Arc<dyn Clock>) -> Self {
        Self { store, daily, clock }
    }

    async fn send_reminder(&self, appointment_id: Uuid) -> Result<JobOutcome, AppError> {
        let Some(appointment) = self.store.find_appointment(appointment_id).await? else {
            return Ok(missing(appointment_id));
        };

        if !appointment.is_active() {
            return Ok(JobOutcome::Skipped {
                reason: format!("Appointment {} is {}", appointment_id, appointment.status),
            });
        }

        let client = self.store.find_client(appointment.client_id).await?;
        let specialist = self.store.find_specialist(appointment.specialist_id).await?;

        info!("{}", render_reminder(&appointment, client.as_ref(), specialist.as_ref()));
        Ok(JobOutcome::Completed)
    }

    async fn send_notification(&self, appointment_id: Uuid, kind: NotificationKind) -> Result<JobOutcome, AppError> {
        let Some(appointment) = self.store.find_appointment(appointment_id).await? else {
            return Ok(missing(appointment_id));
        };

        let client = self.store.find_client(appointment.client_id).await?;

        info!("{}", render_notification(&appointment, client.as_ref(), kind));
        Ok(JobOutcome::Completed)
    }

    async fn run_daily_check(&self, job: &Job) -> Result<JobOutcome, AppError> {
        let scheduled = self.daily.run().await?;
        debug!("Daily check {} scheduled {} reminders", job.key, scheduled);

        // Only the standing trigger re-arms itself; the immediate run is one-shot
        if job.key == DAILY_CHECK_KEY {
            return Ok(JobOutcome::Repeat {
                next_run: next_midnight(self.clock.now()),
            });
        }
        Ok(JobOutcome::Completed)
    }
}

#[async_trait]
impl JobProcessor for ReminderProcessor {
    async fn process(&self, job: &Job) -> Result<JobOutcome, AppError> {
        match &job.payload {
            JobPayload::Reminder { appointment_id } => self.send_reminder(*appointment_id).await,
            JobPayload::Notification { appointment_id, notification } => {
                self.send_notification(*appointment_id, *notification).await
            }
            JobPayload::DailyCheck => self.run_daily_check(job).await,
            other => Err(AppError::InvalidArgument(format!(
                "Unexpected {} job on reminders queue",
                other.kind()
            ))),
        }
    }
}

fn missing(appointment_id: Uuid) -> JobOutcome {
    JobOutcome::Skipped {
        reason: format!("Appointment {} not found", appointment_id),
    }
}

fn person(name: Option<(&str, &str)>, id: Uuid) -> String {
    match name {
        Some((name, email)) => format!("{} ({})", name, email),
        None => id.to_string(),
    }
}

pub fn render_reminder(appointment: &Appointment, client: Option<&Client>, specialist: Option<&Specialist>) -> String {
    format!(
        "APPOINTMENT REMINDER\n\
         Date: {} at {}\n\
         Client: {}\n\
         Specialist: {}\n\
         Status: {}\n\
         You have an appointment tomorrow!",
        appointment.date,
        appointment.time,
        person(client.map(|c| (c.name.as_str(), c.email.as_str())), appointment.client_id),
        person(specialist.map(|s| (s.name.as_str(), s.email.as_str())), appointment.specialist_id),
        appointment.status,
    )
}

pub fn render_notification(appointment: &Appointment, client: Option<&Client>, kind: NotificationKind) -> String {
    let title = match kind {
        NotificationKind::Confirmation => "CONFIRMATION",
        NotificationKind::Cancellation => "CANCELLATION",
    };
    let verb = match kind {
        NotificationKind::Confirmation => "confirmed",
        NotificationKind::Cancellation => "cancelled",
    };

    format!(
        "APPOINTMENT {}\n\
         Appointment {} {}\n\
         Client: {}\n\
         Date: {} at {}",
        title,
        appointment.id,
        verb,
        client.map(|c| c.name.clone()).unwrap_or_else(|| appointment.client_id.to_string()),
        appointment.date,
        appointment.time,
    )
}
