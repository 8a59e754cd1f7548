use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::PlatformData;

/// An open bookable window. Produced per availability query and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub provider_id: String,
    pub service_id: String,
    pub platform_data: PlatformData,
}

impl TimeSlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSlot {
    #[serde(flatten)]
    pub slot: TimeSlot,
    pub score: f64,
}
