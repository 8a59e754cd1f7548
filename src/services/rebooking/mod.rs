pub mod pattern;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use crate::errors::AppError;
use crate::models::{
    days_after, Appointment, ProviderSummary, RebookingSuggestion, ScoredSlot, ServiceSummary,
};
use crate::services::platforms::{
    AppointmentFilters, AvailabilityFilters, BookingDetails, BookingPlatform,
};

pub use pattern::analyze_patterns;
pub use scoring::{format_slot_time, rank_slots, score_slot};

pub const REBOOKING_NOTE: &str = "Booked via automated rebooking system";

/// Default days between visits per service type, matched against the
/// dash-separated parts of a service id.
const SERVICE_INTERVALS: &[(&str, i64)] = &[
    ("haircut", 42),
    ("color", 35),
    ("highlights", 56),
    ("facial", 28),
    ("massage", 21),
    ("manicure", 14),
    ("pedicure", 28),
];

const FALLBACK_INTERVAL_DAYS: i64 = 30;

pub fn default_interval_for_service(service_id: &str) -> i64 {
    let lower = service_id.to_lowercase();
    lower
        .split('-')
        .find_map(|part| {
            SERVICE_INTERVALS
                .iter()
                .find(|(kind, _)| *kind == part)
                .map(|(_, days)| *days)
        })
        .unwrap_or(FALLBACK_INTERVAL_DAYS)
}

#[derive(Debug, Clone)]
pub struct SuggestionOptions {
    pub days_ahead: i64,
    pub max_suggestions: usize,
    pub prefer_same_provider: bool,
    /// Availability filter used when the history has no most-common service,
    /// typically the service of the appointment that was just cancelled.
    pub service_id: Option<String>,
}

impl Default for SuggestionOptions {
    fn default() -> Self {
        Self {
            days_ahead: 14,
            max_suggestions: 3,
            prefer_same_provider: false,
            service_id: None,
        }
    }
}

pub struct RebookingService {
    platform: Arc<dyn BookingPlatform>,
}

impl RebookingService {
    pub fn new(platform: Arc<dyn BookingPlatform>) -> Self {
        Self { platform }
    }

    /// Ranks open slots in `[now, now + days_ahead]` against the customer's
    /// history and returns the best few as suggestions.
    pub async fn generate_suggestions(
        &self,
        customer_id: &str,
        options: &SuggestionOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<RebookingSuggestion>, AppError> {
        let start = now.date_naive();
        let end = days_after(now, options.days_ahead)
            .ok_or_else(|| {
                AppError::Validation(format!("days_ahead {} is out of range", options.days_ahead))
            })?
            .date_naive();

        let history = self
            .platform
            .get_customer_appointments(customer_id, &AppointmentFilters::default())
            .await?;
        if history.is_empty() {
            tracing::info!(customer_id, "no appointment history, using default pattern");
        }
        let pattern = analyze_patterns(&history);

        let filters = AvailabilityFilters {
            service_id: pattern
                .most_common_service
                .clone()
                .or_else(|| options.service_id.clone()),
            provider_id: if options.prefer_same_provider {
                pattern.most_common_provider.clone()
            } else {
                None
            },
        };
        let slots = self.platform.get_availability(start, end, &filters).await?;
        if slots.is_empty() {
            tracing::info!(customer_id, "no availability found");
            return Ok(Vec::new());
        }

        let ranked = rank_slots(slots, &pattern);
        let mut suggestions = Vec::new();
        let mut services: HashMap<String, ServiceSummary> = HashMap::new();
        let mut providers: HashMap<String, ProviderSummary> = HashMap::new();

        for scored in ranked.into_iter().take(options.max_suggestions) {
            let service = match services.get(&scored.slot.service_id) {
                Some(summary) => summary.clone(),
                None => {
                    let summary = self.service_summary(&scored).await;
                    services.insert(summary.id.clone(), summary.clone());
                    summary
                }
            };
            let provider = match providers.get(&scored.slot.provider_id) {
                Some(summary) => summary.clone(),
                None => {
                    let summary = self.provider_summary(&scored.slot.provider_id).await;
                    providers.insert(summary.id.clone(), summary.clone());
                    summary
                }
            };

            suggestions.push(RebookingSuggestion {
                formatted_date_time: format_slot_time(&scored.slot.start_time),
                score: scored.score,
                time_slot: scored.slot,
                service,
                provider,
                customer_id: customer_id.to_string(),
            });
        }

        tracing::info!(customer_id, count = suggestions.len(), "generated rebooking suggestions");
        Ok(suggestions)
    }

    async fn service_summary(&self, scored: &ScoredSlot) -> ServiceSummary {
        let id = scored.slot.service_id.clone();
        let fallback_duration = scored.slot.duration_minutes();
        match self.platform.get_service(&id).await {
            Ok(service) => ServiceSummary {
                id,
                name: service.name,
                duration: service.duration.unwrap_or(fallback_duration),
                price: service.price,
            },
            Err(e) => {
                tracing::warn!(service_id = %id, error = %e, "service lookup failed");
                ServiceSummary {
                    id,
                    name: None,
                    duration: fallback_duration,
                    price: None,
                }
            }
        }
    }

    async fn provider_summary(&self, provider_id: &str) -> ProviderSummary {
        match self.platform.get_provider(provider_id).await {
            Ok(provider) => ProviderSummary {
                id: provider_id.to_string(),
                first_name: provider.first_name,
                last_name: provider.last_name,
            },
            Err(e) => {
                tracing::warn!(provider_id, error = %e, "provider lookup failed");
                ProviderSummary {
                    id: provider_id.to_string(),
                    first_name: None,
                    last_name: None,
                }
            }
        }
    }

    /// Last visit for the service plus the customer's average gap between
    /// visits for it. Without any history for the service, falls back to
    /// `now` plus the service type's default interval.
    pub async fn recommended_next_date(
        &self,
        customer_id: &str,
        service_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<FixedOffset>, AppError> {
        let history = self
            .platform
            .get_customer_appointments(customer_id, &AppointmentFilters::default())
            .await?;
        next_date_from_history(&history, service_id, now)
    }

    /// Books a suggestion as-is. Not retried on failure.
    pub async fn book_suggestion(&self, suggestion: &RebookingSuggestion) -> Result<Appointment, AppError> {
        let details = BookingDetails {
            customer_id: suggestion.customer_id.clone(),
            service_id: suggestion.service.id.clone(),
            provider_id: suggestion.provider.id.clone(),
            start_time: suggestion.time_slot.start_time,
            notes: Some(REBOOKING_NOTE.to_string()),
        };
        let appointment = self.platform.book_appointment(&details).await?;
        tracing::info!(
            customer_id = %suggestion.customer_id,
            appointment_id = ?appointment.id,
            "booked rebooking suggestion"
        );
        Ok(appointment)
    }
}

pub fn next_date_from_history(
    history: &[Appointment],
    service_id: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<FixedOffset>, AppError> {
    let out_of_range = || AppError::Validation("next visit date is out of range".to_string());

    let mut visits: Vec<DateTime<FixedOffset>> = history
        .iter()
        .filter(|a| a.service_id.as_deref() == Some(service_id))
        .filter_map(|a| a.start_time)
        .collect();
    visits.sort();

    let Some(last) = visits.last().copied() else {
        return days_after(now, default_interval_for_service(service_id))
            .map(|date| date.fixed_offset())
            .ok_or_else(out_of_range);
    };

    let intervals: Vec<i64> = visits
        .windows(2)
        .map(|pair| pattern::days_between(pair[0], pair[1]))
        .collect();
    let average = if intervals.is_empty() {
        default_interval_for_service(service_id) as f64
    } else {
        intervals.iter().sum::<i64>() as f64 / intervals.len() as f64
    };

    days_after(last, average.round() as i64).ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, Platform, PlatformData};

    fn visit(start: &str, service: &str) -> Appointment {
        Appointment {
            id: None,
            customer_id: Some("c-1".to_string()),
            service_id: Some(service.to_string()),
            provider_id: None,
            start_time: Some(DateTime::parse_from_rfc3339(start).unwrap()),
            end_time: None,
            status: AppointmentStatus::Completed,
            notes: String::new(),
            price: 0.0,
            platform_data: PlatformData::new(Platform::Vagaro, None),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_default_intervals_by_service_type() {
        assert_eq!(default_interval_for_service("haircut-basic"), 42);
        assert_eq!(default_interval_for_service("Color-Full"), 35);
        assert_eq!(default_interval_for_service("svc-highlights"), 56);
        assert_eq!(default_interval_for_service("manicure"), 14);
        assert_eq!(default_interval_for_service("balayage"), 30);
        assert_eq!(default_interval_for_service("haircutting"), 30);
    }

    #[test]
    fn test_next_date_without_history_uses_default() {
        let next = next_date_from_history(&[], "massage-deep", now()).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-06-22T12:00:00+00:00");
    }

    #[test]
    fn test_next_date_uses_average_gap_for_service() {
        let history = vec![
            visit("2024-01-01T10:00:00Z", "haircut"),
            visit("2024-02-05T10:00:00Z", "color"),
            visit("2024-02-12T10:00:00Z", "haircut"),
            visit("2024-03-25T10:00:00Z", "haircut"),
        ];
        let next = next_date_from_history(&history, "haircut", now()).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-05-06T10:00:00+00:00");
    }

    #[test]
    fn test_next_date_single_visit_uses_service_default() {
        let history = vec![visit("2024-05-01T10:00:00-04:00", "pedicure")];
        let next = next_date_from_history(&history, "pedicure", now()).unwrap();
        assert_eq!(next.to_rfc3339(), "2024-05-29T10:00:00-04:00");
    }

    #[test]
    fn test_next_date_past_calendar_end_is_an_error() {
        let err = next_date_from_history(&[], "haircut", DateTime::<Utc>::MAX_UTC).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
