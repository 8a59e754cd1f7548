use std::fmt;

use chrono::Weekday;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Default visit interval in days when a customer has fewer than two visits.
pub const DEFAULT_INTERVAL_DAYS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Daypart {
    Morning,
    Afternoon,
    Evening,
}

impl Daypart {
    pub const ALL: [Daypart; 3] = [Daypart::Morning, Daypart::Afternoon, Daypart::Evening];

    /// Hours outside [6, 22) belong to no daypart.
    pub fn from_hour(hour: u32) -> Option<Self> {
        match hour {
            6..=11 => Some(Daypart::Morning),
            12..=16 => Some(Daypart::Afternoon),
            17..=21 => Some(Daypart::Evening),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Daypart::Morning => "morning",
            Daypart::Afternoon => "afternoon",
            Daypart::Evening => "evening",
        }
    }
}

impl fmt::Display for Daypart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Irregular,
}

impl VisitFrequency {
    pub const ALL: [VisitFrequency; 5] = [
        VisitFrequency::Weekly,
        VisitFrequency::Biweekly,
        VisitFrequency::Monthly,
        VisitFrequency::Quarterly,
        VisitFrequency::Irregular,
    ];

    pub fn from_interval(days: i64) -> Self {
        match days {
            d if d <= 9 => VisitFrequency::Weekly,
            d if d <= 18 => VisitFrequency::Biweekly,
            d if d <= 35 => VisitFrequency::Monthly,
            d if d <= 100 => VisitFrequency::Quarterly,
            _ => VisitFrequency::Irregular,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitFrequency::Weekly => "weekly",
            VisitFrequency::Biweekly => "biweekly",
            VisitFrequency::Monthly => "monthly",
            VisitFrequency::Quarterly => "quarterly",
            VisitFrequency::Irregular => "irregular",
        }
    }
}

impl fmt::Display for VisitFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weekdays in the order their buckets are registered.
pub const WEEKDAYS_FROM_SUNDAY: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Counter that remembers the order in which keys were first registered.
///
/// `most_common` returns the key with the strictly highest count; on a tie
/// the earliest registered key wins, which keeps results reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally<K> {
    entries: Vec<(K, u32)>,
}

impl<K> Default for Tally<K> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K: PartialEq + Clone> Tally<K> {
    /// A tally with every bucket pre-registered at zero.
    pub fn with_keys(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            entries: keys.into_iter().map(|k| (k, 0)).collect(),
        }
    }

    pub fn increment(&mut self, key: K) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((key, 1)),
        }
    }

    pub fn count(&self, key: &K) -> u32 {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn most_common(&self) -> Option<K> {
        let mut best: Option<(&K, u32)> = None;
        for (key, count) in &self.entries {
            if *count > best.map(|(_, c)| c).unwrap_or(0) {
                best = Some((key, *count));
            }
        }
        best.map(|(k, _)| k.clone())
    }
}

impl<K: fmt::Display> Serialize for Tally<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(&key.to_string(), count)?;
        }
        map.end()
    }
}

/// Statistical summary of one customer's appointment history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPattern {
    pub services: Tally<String>,
    pub providers: Tally<String>,
    pub preferred_days: Tally<Weekday>,
    pub preferred_times: Tally<Daypart>,
    pub frequency: Tally<VisitFrequency>,
    pub intervals: Vec<i64>,
    pub average_interval: f64,
    pub most_common_service: Option<String>,
    pub most_common_provider: Option<String>,
    pub most_common_day: Option<Weekday>,
    pub most_common_time: Option<Daypart>,
    pub most_common_frequency: Option<VisitFrequency>,
}

impl Default for AppointmentPattern {
    fn default() -> Self {
        Self {
            services: Tally::default(),
            providers: Tally::default(),
            preferred_days: Tally::with_keys(WEEKDAYS_FROM_SUNDAY),
            preferred_times: Tally::with_keys(Daypart::ALL),
            frequency: Tally::with_keys(VisitFrequency::ALL),
            intervals: Vec::new(),
            average_interval: DEFAULT_INTERVAL_DAYS,
            most_common_service: None,
            most_common_provider: None,
            most_common_day: None,
            most_common_time: None,
            most_common_frequency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daypart_boundaries() {
        assert_eq!(Daypart::from_hour(5), None);
        assert_eq!(Daypart::from_hour(6), Some(Daypart::Morning));
        assert_eq!(Daypart::from_hour(11), Some(Daypart::Morning));
        assert_eq!(Daypart::from_hour(12), Some(Daypart::Afternoon));
        assert_eq!(Daypart::from_hour(17), Some(Daypart::Evening));
        assert_eq!(Daypart::from_hour(21), Some(Daypart::Evening));
        assert_eq!(Daypart::from_hour(22), None);
    }

    #[test]
    fn test_frequency_thresholds() {
        assert_eq!(VisitFrequency::from_interval(7), VisitFrequency::Weekly);
        assert_eq!(VisitFrequency::from_interval(9), VisitFrequency::Weekly);
        assert_eq!(VisitFrequency::from_interval(10), VisitFrequency::Biweekly);
        assert_eq!(VisitFrequency::from_interval(18), VisitFrequency::Biweekly);
        assert_eq!(VisitFrequency::from_interval(35), VisitFrequency::Monthly);
        assert_eq!(VisitFrequency::from_interval(100), VisitFrequency::Quarterly);
        assert_eq!(VisitFrequency::from_interval(101), VisitFrequency::Irregular);
    }

    #[test]
    fn test_tally_tie_goes_to_first_registered() {
        let mut tally = Tally::default();
        tally.increment("b".to_string());
        tally.increment("a".to_string());
        tally.increment("a".to_string());
        tally.increment("b".to_string());
        assert_eq!(tally.most_common(), Some("b".to_string()));
    }

    #[test]
    fn test_tally_all_zero_has_no_most_common() {
        let tally = Tally::with_keys(Daypart::ALL);
        assert_eq!(tally.total(), 0);
        assert_eq!(tally.most_common(), None);
    }

    #[test]
    fn test_tally_serializes_in_registration_order() {
        let mut tally = Tally::with_keys(Daypart::ALL);
        tally.increment(Daypart::Evening);
        let json = serde_json::to_string(&tally).unwrap();
        assert_eq!(json, r#"{"morning":0,"afternoon":0,"evening":1}"#);
    }
}
