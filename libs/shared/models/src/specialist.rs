use std::collections::BTreeMap;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::{weekday_name, TimeOfDay};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Specialist {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub specialty: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// Reserved for slot-spacing enforcement; not consulted yet.
    #[serde(default = "default_min_interval")]
    pub min_interval_minutes: u32,
    #[serde(default)]
    pub availability: WeeklyAvailability,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_daily_limit() -> u32 {
    8
}

fn default_min_interval() -> u32 {
    30
}

/// Declared bookable slot starts keyed by lowercase weekday name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeeklyAvailability(BTreeMap<String, Vec<TimeOfDay>>);

impl WeeklyAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, weekday: Weekday, slots: Vec<TimeOfDay>) -> Self {
        self.0.insert(weekday_name(weekday).to_string(), slots);
        self
    }

    pub fn insert(&mut self, day: String, slots: Vec<TimeOfDay>) {
        self.0.insert(day, slots);
    }

    /// Slots declared for a weekday, in declaration order; empty when the day has no entry.
    pub fn slots_for(&self, weekday: Weekday) -> &[TimeOfDay] {
        self.0
            .get(weekday_name(weekday))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn days(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
