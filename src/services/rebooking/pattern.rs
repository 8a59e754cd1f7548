use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::models::{Appointment, AppointmentPattern, Daypart, VisitFrequency};

/// Whole days between two instants, rounded to the nearest day.
pub(crate) fn days_between(earlier: DateTime<FixedOffset>, later: DateTime<FixedOffset>) -> i64 {
    let seconds = (later - earlier).num_seconds() as f64;
    (seconds / 86_400.0).round() as i64
}

/// Reduces a customer's history to counts, intervals and most-common values.
///
/// Appointments without a start time carry no scheduling signal and are
/// skipped. An empty history yields [`AppointmentPattern::default`].
pub fn analyze_patterns(appointments: &[Appointment]) -> AppointmentPattern {
    let mut dated: Vec<&Appointment> = appointments.iter().filter(|a| a.start_time.is_some()).collect();
    dated.sort_by_key(|a| a.start_time);

    let mut pattern = AppointmentPattern::default();

    for appointment in &dated {
        let Some(start) = appointment.start_time else {
            continue;
        };
        if let Some(service_id) = &appointment.service_id {
            pattern.services.increment(service_id.clone());
        }
        if let Some(provider_id) = &appointment.provider_id {
            pattern.providers.increment(provider_id.clone());
        }
        pattern.preferred_days.increment(start.weekday());
        if let Some(daypart) = Daypart::from_hour(start.hour()) {
            pattern.preferred_times.increment(daypart);
        }
    }

    for pair in dated.windows(2) {
        if let (Some(prev), Some(curr)) = (pair[0].start_time, pair[1].start_time) {
            let days = days_between(prev, curr);
            pattern.intervals.push(days);
            pattern.frequency.increment(VisitFrequency::from_interval(days));
        }
    }

    if !pattern.intervals.is_empty() {
        pattern.average_interval =
            pattern.intervals.iter().sum::<i64>() as f64 / pattern.intervals.len() as f64;
    }

    pattern.most_common_service = pattern.services.most_common();
    pattern.most_common_provider = pattern.providers.most_common();
    pattern.most_common_day = pattern.preferred_days.most_common();
    pattern.most_common_time = pattern.preferred_times.most_common();
    pattern.most_common_frequency = pattern.frequency.most_common();

    tracing::debug!(
        appointments = dated.len(),
        average_interval = pattern.average_interval,
        "analyzed appointment pattern"
    );
    pattern
}
