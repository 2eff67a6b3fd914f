use serde::{Deserialize, Serialize};

use shared_models::TimeOfDay;

/// One declared slot of a specialist's day and whether it can still be booked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySlot {
    pub time: TimeOfDay,
    pub available: bool,
}
