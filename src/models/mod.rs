use chrono::{DateTime, Duration, TimeZone};

pub mod appointment;
pub mod customer;
pub mod message;
pub mod pattern;
pub mod platform;
pub mod slot;
pub mod suggestion;

pub use appointment::{Appointment, AppointmentStatus};
pub use customer::{Customer, Provider, Service};
pub use message::{Message, MessageEdit, MessageStatus, MessageType, SalonProfile, ScheduledMessage};
pub use pattern::{AppointmentPattern, Daypart, Tally, VisitFrequency};
pub use platform::{Platform, PlatformData};
pub use slot::{ScoredSlot, TimeSlot};
pub use suggestion::{ProviderSummary, RebookingSuggestion, ServiceSummary};

/// `time` moved by whole days, or `None` outside chrono's representable range.
pub fn days_after<Tz: TimeZone>(time: DateTime<Tz>, days: i64) -> Option<DateTime<Tz>> {
    Duration::try_days(days).and_then(|delta| time.checked_add_signed(delta))
}
