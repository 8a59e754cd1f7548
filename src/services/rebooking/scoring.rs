use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::models::{AppointmentPattern, Daypart, ScoredSlot, Tally, TimeSlot};

const WEEKDAY_WEIGHT: f64 = 40.0;
const DAYPART_WEIGHT: f64 = 30.0;
const PROVIDER_BONUS: f64 = 20.0;
const SERVICE_BONUS: f64 = 10.0;

fn share<K: PartialEq + Clone>(tally: &Tally<K>, key: &K) -> f64 {
    f64::from(tally.count(key)) / f64::from(tally.total().max(1))
}

pub fn score_slot(slot: &TimeSlot, pattern: &AppointmentPattern) -> f64 {
    let start = slot.start_time;
    let mut score = share(&pattern.preferred_days, &start.weekday()) * WEEKDAY_WEIGHT;

    if let Some(daypart) = Daypart::from_hour(start.hour()) {
        score += share(&pattern.preferred_times, &daypart) * DAYPART_WEIGHT;
    }
    if pattern.most_common_provider.as_deref() == Some(slot.provider_id.as_str()) {
        score += PROVIDER_BONUS;
    }
    if pattern.most_common_service.as_deref() == Some(slot.service_id.as_str()) {
        score += SERVICE_BONUS;
    }
    score
}

/// Scores every slot and orders them best first. Equal scores keep their
/// input order.
pub fn rank_slots(slots: Vec<TimeSlot>, pattern: &AppointmentPattern) -> Vec<ScoredSlot> {
    let mut scored: Vec<ScoredSlot> = slots
        .into_iter()
        .map(|slot| {
            let score = score_slot(&slot, pattern);
            ScoredSlot { slot, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// e.g. `Thursday, January 25, 2024 at 2:00 PM`, in the slot's own offset.
pub fn format_slot_time(start: &DateTime<FixedOffset>) -> String {
    start.format("%A, %B %-d, %Y at %-I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appointment, AppointmentStatus, Platform, PlatformData};
    use crate::services::rebooking::analyze_patterns;

    fn slot(start: &str, provider: &str, service: &str) -> TimeSlot {
        let start_time = DateTime::parse_from_rfc3339(start).unwrap();
        TimeSlot {
            start_time,
            end_time: start_time + chrono::Duration::hours(1),
            provider_id: provider.to_string(),
            service_id: service.to_string(),
            platform_data: PlatformData::new(Platform::Phorest, None),
        }
    }

    fn history(entries: &[(&str, &str, &str)]) -> Vec<Appointment> {
        entries
            .iter()
            .map(|(start, service, provider)| Appointment {
                id: None,
                customer_id: Some("c-1".to_string()),
                service_id: Some(service.to_string()),
                provider_id: Some(provider.to_string()),
                start_time: Some(DateTime::parse_from_rfc3339(start).unwrap()),
                end_time: None,
                status: AppointmentStatus::Completed,
                notes: String::new(),
                price: 0.0,
                platform_data: PlatformData::new(Platform::Phorest, None),
            })
            .collect()
    }

    #[test]
    fn test_perfect_match_scores_100() {
        let pattern = analyze_patterns(&history(&[("2024-01-18T14:00:00Z", "cut", "p1")]));
        let score = score_slot(&slot("2024-01-25T15:00:00Z", "p1", "cut"), &pattern);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_empty_pattern_gives_zero_weighted_scores() {
        let pattern = AppointmentPattern::default();
        let ranked = rank_slots(
            vec![
                slot("2024-01-25T09:00:00Z", "p1", "cut"),
                slot("2024-01-26T18:00:00Z", "p2", "color"),
            ],
            &pattern,
        );
        assert!(ranked.iter().all(|s| s.score == 0.0));
        assert_eq!(ranked[0].slot.provider_id, "p1");
    }

    #[test]
    fn test_bonus_only_scores_when_day_and_time_are_unknown() {
        let mut pattern = AppointmentPattern::default();
        pattern.most_common_provider = Some("p1".to_string());
        pattern.most_common_service = Some("cut".to_string());

        let scores: Vec<f64> = [
            slot("2024-01-25T09:00:00Z", "p9", "x"),
            slot("2024-01-25T09:00:00Z", "p9", "cut"),
            slot("2024-01-25T09:00:00Z", "p1", "x"),
            slot("2024-01-25T09:00:00Z", "p1", "cut"),
        ]
        .iter()
        .map(|s| score_slot(s, &pattern))
        .collect();
        assert_eq!(scores, vec![0.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_ranking_is_descending_and_stable() {
        let pattern = analyze_patterns(&history(&[
            ("2024-01-04T10:00:00Z", "cut", "p1"),
            ("2024-01-11T10:00:00Z", "cut", "p1"),
            ("2024-01-16T18:00:00Z", "color", "p2"),
        ]));
        let slots = vec![
            slot("2024-01-23T18:00:00Z", "p3", "cut"),
            slot("2024-01-25T10:00:00Z", "p1", "cut"),
            slot("2024-01-24T23:00:00Z", "p3", "x"),
            slot("2024-01-24T23:30:00Z", "p3", "x"),
        ];
        let ranked = rank_slots(slots, &pattern);

        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(ranked[0].slot.provider_id, "p1");
        // The two zero-scored overnight slots stay in input order.
        let last_two: Vec<_> = ranked[2..].iter().map(|s| s.slot.start_time.minute()).collect();
        assert_eq!(last_two, vec![0, 30]);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let pattern = analyze_patterns(&history(&[("2024-01-04T10:00:00Z", "cut", "p1")]));
        let slots = vec![
            slot("2024-01-25T10:00:00Z", "p2", "cut"),
            slot("2024-01-25T10:00:00Z", "p1", "cut"),
        ];
        assert_eq!(rank_slots(slots.clone(), &pattern), rank_slots(slots, &pattern));
    }

    #[test]
    fn test_format_slot_time() {
        let start = DateTime::parse_from_rfc3339("2024-01-25T14:00:00-05:00").unwrap();
        assert_eq!(format_slot_time(&start), "Thursday, January 25, 2024 at 2:00 PM");
        let start = DateTime::parse_from_rfc3339("2024-03-03T09:05:00Z").unwrap();
        assert_eq!(format_slot_time(&start), "Sunday, March 3, 2024 at 9:05 AM");
    }
}
