use std::sync::Arc;
use chrono::{DateTime, NaiveDate, TimeZone, Utc, Weekday};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Client, Specialist, TimeOfDay, WeeklyAvailability};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Default::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            queue_backoff_ms: 10,
            webhook_backoff_ms: 10,
            worker_poll_interval_ms: 10,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Monday 2 March 2026, 08:00 on the shared local clock.
pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub fn next_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
}

pub fn slot(raw: &str) -> TimeOfDay {
    raw.parse().expect("fixture time must be HH:MM")
}

pub struct TestSpecialist {
    pub daily_limit: u32,
    pub availability: WeeklyAvailability,
}

impl Default for TestSpecialist {
    fn default() -> Self {
        Self {
            daily_limit: 10,
            availability: WeeklyAvailability::new()
                .with_day(Weekday::Mon, vec![slot("09:00"), slot("10:00")]),
        }
    }
}

impl TestSpecialist {
    pub fn with_slots(weekday: Weekday, slots: &[&str]) -> Self {
        Self {
            availability: WeeklyAvailability::new()
                .with_day(weekday, slots.iter().map(|s| slot(s)).collect()),
            ..Default::default()
        }
    }

    pub fn daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    pub fn build(self) -> Specialist {
        Specialist {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Dr. Ana Souza".to_string(),
            email: "ana@example.com".to_string(),
            specialty: "physiotherapy".to_string(),
            daily_limit: self.daily_limit,
            min_interval_minutes: 30,
            availability: self.availability,
            created_at: monday_morning(),
            updated_at: monday_morning(),
        }
    }
}

pub fn test_client() -> Client {
    Client {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: "Carlos Lima".to_string(),
        email: "carlos@example.com".to_string(),
        created_at: monday_morning(),
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn specialist_response(specialist_id: Uuid) -> serde_json::Value {
        json!({
            "id": specialist_id,
            "user_id": Uuid::new_v4(),
            "name": "Dr. Ana Souza",
            "email": "ana@example.com",
            "specialty": "physiotherapy",
            "daily_limit": 8,
            "min_interval_minutes": 30,
            "availability": { "monday": ["09:00", "10:00"] },
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(appointment_id: Uuid, specialist_id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "client_id": Uuid::new_v4(),
            "specialist_id": specialist_id,
            "scheduled_by_id": Uuid::new_v4(),
            "date": "2026-03-09",
            "time": "09:00:00",
            "status": status,
            "rescheduled_from_id": null,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn webhook_response(webhook_id: Uuid, url: &str, events: &[&str]) -> serde_json::Value {
        json!({
            "id": webhook_id,
            "name": "crm sync",
            "url": url,
            "secret": "whsec_test",
            "events": events,
            "is_active": true,
            "created_by": Uuid::new_v4(),
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_service_key, "test-service-key");
        assert!(app_config.is_configured());
    }

    #[test]
    fn test_fixture_dates_fall_on_mondays() {
        assert_eq!(monday_morning().weekday(), Weekday::Mon);
        assert_eq!(next_monday().weekday(), Weekday::Mon);
    }

    #[test]
    fn test_specialist_fixture_parses_as_record() {
        let value = MockSupabaseResponses::specialist_response(Uuid::new_v4());
        let specialist: Specialist = serde_json::from_value(value).unwrap();
        assert_eq!(specialist.availability.slots_for(Weekday::Mon).len(), 2);
    }
}
