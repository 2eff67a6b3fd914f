use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use job_queue_cell::JobScheduler;
use shared_database::BookingStore;
use shared_models::{AppError, AppointmentFilter};
use shared_utils::Clock;

/// Sweep that arms reminders for tomorrow's PENDING appointments that lack one.
pub struct DailyReminderRunner {
    store: Arc<dyn BookingStore>,
    scheduler: Arc<JobScheduler>,
    clock: Arc<dyn Clock>,
}

impl DailyReminderRunner {
    pub fn new(store: Arc<dyn BookingStore>, scheduler: Arc<JobScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self { store, scheduler, clock }
    }

    /// Returns how many appointments got new jobs.
    pub async fn run(&self) -> Result<usize, AppError> {
        let tomorrow = self.clock.now().date_naive() + Duration::days(1);
        let pending = self.store.find_appointments(&AppointmentFilter::pending_on(tomorrow)).await?;

        info!("Found {} pending appointments for {}", pending.len(), tomorrow);

        let mut scheduled = 0;
        for appointment in &pending {
            if self.scheduler.has_reminder(appointment.id).await? {
                continue;
            }
            self.scheduler.schedule_reminder(appointment).await?;
            debug!("Scheduled missing reminder for appointment {}", appointment.id);
            scheduled += 1;
        }

        info!("Daily check scheduled {} new reminders", scheduled);
        Ok(scheduled)
    }
}
