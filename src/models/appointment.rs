use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::PlatformData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Option<String>,
    pub customer_id: Option<String>,
    pub service_id: Option<String>,
    pub provider_id: Option<String>,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub price: f64,
    pub platform_data: PlatformData,
}

impl Appointment {
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }
}

/// Canonical appointment status.
///
/// Platforms report statuses this crate has no mapping for. Those are kept
/// lower-cased in `Unrecognized` rather than rejected, so a new platform
/// status never drops an event on the floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    Unrecognized(String),
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
            AppointmentStatus::Unrecognized(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => AppointmentStatus::Pending,
            "confirmed" => AppointmentStatus::Confirmed,
            "completed" => AppointmentStatus::Completed,
            "cancelled" => AppointmentStatus::Cancelled,
            "no-show" => AppointmentStatus::NoShow,
            other => AppointmentStatus::Unrecognized(other.to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AppointmentStatus::Unrecognized(_))
    }
}

impl From<String> for AppointmentStatus {
    fn from(s: String) -> Self {
        AppointmentStatus::parse(&s)
    }
}

impl From<AppointmentStatus> for String {
    fn from(status: AppointmentStatus) -> Self {
        status.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_canonical_names() {
        for s in ["pending", "confirmed", "completed", "cancelled", "no-show"] {
            let status = AppointmentStatus::parse(s);
            assert!(status.is_recognized());
            assert_eq!(status.as_str(), s);
        }
    }

    #[test]
    fn test_unknown_status_is_lowercased() {
        let status = AppointmentStatus::parse("Arrived");
        assert_eq!(status, AppointmentStatus::Unrecognized("arrived".to_string()));
        assert_eq!(status.as_str(), "arrived");
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&AppointmentStatus::NoShow).unwrap();
        assert_eq!(json, "\"no-show\"");
    }
}
