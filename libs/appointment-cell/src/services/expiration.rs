use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use job_queue_cell::{Job, JobOutcome, JobPayload, JobProcessor};
use shared_database::BookingStore;
use shared_models::{AppError, AppointmentStatus};

/// Processor for the `expirations` queue: PENDING appointments whose start
/// passed without confirmation become EXPIRED.
pub struct ExpirationProcessor {
    store: Arc<dyn BookingStore>,
}

impl ExpirationProcessor {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobProcessor for ExpirationProcessor {
    async fn process(&self, job: &Job) -> Result<JobOutcome, AppError> {
        let JobPayload::Expiration { appointment_id } = &job.payload else {
            return Err(AppError::InvalidArgument(format!(
                "Unexpected {} job on expirations queue",
                job.payload.kind()
            )));
        };

        let Some(appointment) = self.store.find_appointment(*appointment_id).await? else {
            return Ok(JobOutcome::Skipped {
                reason: format!("Appointment {} not found", appointment_id),
            });
        };

        if appointment.status != AppointmentStatus::Pending {
            return Ok(JobOutcome::Skipped {
                reason: format!("Appointment {} is {}", appointment_id, appointment.status),
            });
        }

        self.store
            .update_appointment_status(*appointment_id, AppointmentStatus::Expired)
            .await?;

        info!("Appointment {} marked as expired", appointment_id);
        Ok(JobOutcome::Completed)
    }
}
