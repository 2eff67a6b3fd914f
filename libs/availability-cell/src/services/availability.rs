use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::BookingStore;
use shared_models::{
    weekday_name, AppError, AppointmentFilter, Specialist, TimeOfDay, WeeklyAvailability,
    WEEKDAY_NAMES,
};

use crate::models::DaySlot;

pub struct AvailabilityService {
    store: Arc<dyn BookingStore>,
    time_pattern: Regex,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self {
            store,
            time_pattern: Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("time pattern is valid"),
        }
    }

    /// Bookable slot starts for a specialist on a date, in declared order.
    ///
    /// A slot is dropped when an active appointment holds exactly that time.
    /// Once the day's active bookings reach the daily limit nothing is offered.
    pub async fn available_slots(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeOfDay>, AppError> {
        let specialist = self.load_specialist(specialist_id).await?;
        let declared = specialist.availability.slots_for(date.weekday());
        if declared.is_empty() {
            debug!("No slots declared for {} on {}", specialist_id, weekday_name(date.weekday()));
            return Ok(vec![]);
        }

        let taken = self.booked_times(specialist_id, date).await?;
        if taken.len() as u32 >= specialist.daily_limit {
            debug!(
                "Specialist {} reached daily limit {} on {}",
                specialist_id, specialist.daily_limit, date
            );
            return Ok(vec![]);
        }

        let slots: Vec<TimeOfDay> = declared
            .iter()
            .filter(|slot| !taken.contains(slot))
            .copied()
            .collect();

        debug!("Found {} available slots for {} on {}", slots.len(), specialist_id, date);
        Ok(slots)
    }

    pub async fn is_available(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
        time: TimeOfDay,
    ) -> Result<bool, AppError> {
        let slots = self.available_slots(specialist_id, date).await?;
        Ok(slots.contains(&time))
    }

    /// Every declared slot for the date, flagged with whether it is still bookable.
    pub async fn day_schedule(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<DaySlot>, AppError> {
        let specialist = self.load_specialist(specialist_id).await?;
        let declared = specialist.availability.slots_for(date.weekday());
        let open: HashSet<TimeOfDay> = self
            .available_slots(specialist_id, date)
            .await?
            .into_iter()
            .collect();

        Ok(declared
            .iter()
            .map(|time| DaySlot {
                time: *time,
                available: open.contains(time),
            })
            .collect())
    }

    /// Checks the shape of a raw weekly availability document.
    ///
    /// The document must be an object keyed by lowercase weekday names whose
    /// values are arrays of `HH:MM` strings.
    pub fn validate_availability(&self, raw: &Value) -> Result<WeeklyAvailability, AppError> {
        let days = raw.as_object().ok_or_else(|| {
            AppError::InvalidArgument("Availability must be an object keyed by weekday".to_string())
        })?;

        let mut availability = WeeklyAvailability::new();
        for (day, slots) in days {
            if !WEEKDAY_NAMES.contains(&day.as_str()) {
                return Err(AppError::InvalidArgument(format!("Invalid day: {}", day)));
            }

            let entries = slots.as_array().ok_or_else(|| {
                AppError::InvalidArgument(format!("Time slots for {} must be an array", day))
            })?;

            let mut times = Vec::with_capacity(entries.len());
            for entry in entries {
                let raw_time = entry
                    .as_str()
                    .filter(|value| self.time_pattern.is_match(value))
                    .ok_or_else(|| {
                        AppError::InvalidArgument(format!("Invalid time format for {}: {}", day, entry))
                    })?;
                times.push(raw_time.parse::<TimeOfDay>()?);
            }

            availability.insert(day.clone(), times);
        }

        Ok(availability)
    }

    pub async fn update_availability(
        &self,
        specialist_id: Uuid,
        raw: &Value,
    ) -> Result<Specialist, AppError> {
        let availability = self.validate_availability(raw)?;
        self.load_specialist(specialist_id).await?;

        let updated = self
            .store
            .update_specialist_availability(specialist_id, &availability)
            .await?;

        info!("Updated availability for specialist {}", specialist_id);
        Ok(updated)
    }

    async fn load_specialist(&self, specialist_id: Uuid) -> Result<Specialist, AppError> {
        self.store
            .find_specialist(specialist_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Specialist {} not found", specialist_id)))
    }

    async fn booked_times(
        &self,
        specialist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeOfDay>, AppError> {
        let appointments = self
            .store
            .find_appointments(&AppointmentFilter::active_for(specialist_id, date))
            .await?;

        Ok(appointments
            .into_iter()
            .filter(|appointment| appointment.is_active())
            .map(|appointment| appointment.time)
            .collect())
    }
}
