//! Field lookup tables and the shared mapping from platform payloads to the
//! canonical model.
//!
//! Every canonical field is read from a list of candidate keys, tried in
//! order. Each platform lists its native casing first and the canonical
//! camelCase name after it, so both raw platform payloads and records that
//! were already normalized come out the same way.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use serde_json::Value;

use crate::models::{
    Appointment, AppointmentStatus, Customer, Platform, PlatformData, Provider, Service, TimeSlot,
};

pub type Keys = &'static [&'static str];

/// Per-platform field names.
#[derive(Debug)]
pub struct Schema {
    pub platform: Platform,
    pub id: Keys,
    pub customer_id: Keys,
    pub service_id: Keys,
    pub provider_id: Keys,
    pub start_time: Keys,
    pub end_time: Keys,
    pub status: Keys,
    pub notes: Keys,
    pub price: Keys,
    pub confirmation_code: Keys,
    pub site_id: Keys,
    pub branch_id: Keys,
    pub first_name: Keys,
    pub last_name: Keys,
    pub email: Keys,
    pub phone: Keys,
    pub member_since: Keys,
    pub name: Keys,
    pub description: Keys,
    pub duration: Keys,
    pub category_id: Keys,
    pub title: Keys,
    pub bio: Keys,
    pub image_url: Keys,
    pub statuses: &'static [(&'static str, AppointmentStatus)],
}

/// First non-blank value under any of `keys`.
pub fn lookup<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| raw.get(*k))
        .find(|v| !is_blank(v))
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub fn text(raw: &Value, keys: &[&str]) -> Option<String> {
    match lookup(raw, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn number(raw: &Value, keys: &[&str]) -> Option<f64> {
    match lookup(raw, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn integer(raw: &Value, keys: &[&str]) -> Option<i64> {
    number(raw, keys).map(|n| n.round() as i64)
}

pub fn timestamp(raw: &Value, keys: &[&str]) -> Option<DateTime<FixedOffset>> {
    text(raw, keys).and_then(|s| parse_timestamp(&s))
}

/// Accepts RFC 3339 instants and offset-less local timestamps. The latter
/// are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Maps a platform status through the schema's table. Unmapped values pass
/// through lower-cased; a missing status reads as pending.
pub fn status(schema: &Schema, raw: &Value) -> AppointmentStatus {
    let Some(value) = text(raw, schema.status) else {
        return AppointmentStatus::Pending;
    };

    if let Some((_, mapped)) = schema.statuses.iter().find(|(native, _)| *native == value) {
        return mapped.clone();
    }

    let status = AppointmentStatus::parse(&value);
    if !status.is_recognized() {
        tracing::warn!(
            platform = %schema.platform,
            status = %value,
            "unmapped appointment status, passing through"
        );
    }
    status
}

fn platform_data(schema: &Schema, raw: &Value) -> PlatformData {
    let mut data = PlatformData::new(schema.platform, text(raw, schema.id));
    data.site_id = text(raw, schema.site_id);
    data.branch_id = text(raw, schema.branch_id);
    data
}

pub fn appointment(schema: &Schema, raw: &Value) -> Appointment {
    let mut platform_data = platform_data(schema, raw);
    platform_data.confirmation_code = text(raw, schema.confirmation_code);

    Appointment {
        id: text(raw, schema.id),
        customer_id: text(raw, schema.customer_id),
        service_id: text(raw, schema.service_id),
        provider_id: text(raw, schema.provider_id),
        start_time: timestamp(raw, schema.start_time),
        end_time: timestamp(raw, schema.end_time),
        status: status(schema, raw),
        notes: text(raw, schema.notes).unwrap_or_default(),
        price: number(raw, schema.price).unwrap_or(0.0),
        platform_data,
    }
}

pub fn customer(schema: &Schema, raw: &Value) -> Customer {
    let mut platform_data = platform_data(schema, raw);
    platform_data.member_since = text(raw, schema.member_since);

    Customer {
        id: text(raw, schema.id),
        first_name: text(raw, schema.first_name),
        last_name: text(raw, schema.last_name),
        email: text(raw, schema.email),
        phone: text(raw, schema.phone),
        platform_data,
    }
}

pub fn service(schema: &Schema, raw: &Value) -> Service {
    let mut platform_data = platform_data(schema, raw);
    platform_data.category_id = text(raw, schema.category_id);

    Service {
        id: text(raw, schema.id),
        name: text(raw, schema.name),
        description: text(raw, schema.description),
        duration: integer(raw, schema.duration),
        price: number(raw, schema.price),
        platform_data,
    }
}

pub fn provider(schema: &Schema, raw: &Value) -> Provider {
    let mut platform_data = platform_data(schema, raw);
    platform_data.image_url = text(raw, schema.image_url);

    Provider {
        id: text(raw, schema.id),
        first_name: text(raw, schema.first_name),
        last_name: text(raw, schema.last_name),
        title: text(raw, schema.title),
        bio: text(raw, schema.bio),
        platform_data,
    }
}

/// Slots without a start time are dropped. A missing end time means an
/// hour-long slot, which is the platforms' native granularity.
pub fn slot(schema: &Schema, raw: &Value, fallback_service: Option<&str>) -> Option<TimeSlot> {
    let start_time = timestamp(raw, schema.start_time)?;
    let end_time = match timestamp(raw, schema.end_time) {
        Some(end) => end,
        None => start_time.checked_add_signed(Duration::hours(1))?,
    };

    Some(TimeSlot {
        start_time,
        end_time,
        provider_id: text(raw, schema.provider_id).unwrap_or_default(),
        service_id: text(raw, schema.service_id)
            .or_else(|| fallback_service.map(str::to_string))
            .unwrap_or_default(),
        platform_data: platform_data(schema, raw),
    })
}

/// Items of a list response that is either a bare array or wrapped under one
/// of `keys`.
pub fn items(body: &Value, keys: &[&str]) -> Vec<Value> {
    if let Value::Array(items) = body {
        return items.clone();
    }
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find_map(|v| v.as_array().cloned())
        .unwrap_or_default()
}

/// A single entity that may arrive wrapped under one of `keys`.
pub fn entity<'a>(body: &'a Value, keys: &[&str]) -> &'a Value {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find(|v| v.is_object())
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_skips_blank_values() {
        let raw = json!({"Id": "", "id": "42"});
        assert_eq!(text(&raw, &["Id", "id"]).as_deref(), Some("42"));
    }

    #[test]
    fn test_numbers_become_text_ids() {
        let raw = json!({"Id": 100234});
        assert_eq!(text(&raw, &["Id"]).as_deref(), Some("100234"));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let with_offset = parse_timestamp("2024-01-25T14:00:00-05:00").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2024-01-25T14:00:00-05:00");

        let naive = parse_timestamp("2024-01-25T14:00:00").unwrap();
        assert_eq!(naive.to_rfc3339(), "2024-01-25T14:00:00+00:00");

        let zulu = parse_timestamp("2024-01-25T14:00:00.000Z").unwrap();
        assert_eq!(zulu.to_rfc3339(), "2024-01-25T14:00:00+00:00");

        assert!(parse_timestamp("next tuesday").is_none());
    }

    #[test]
    fn test_items_accepts_wrapped_and_bare_lists() {
        let bare = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(items(&bare, &["Appointments"]).len(), 2);

        let wrapped = json!({"Appointments": [{"id": 1}], "PaginationResponse": {}});
        assert_eq!(items(&wrapped, &["Appointments"]).len(), 1);

        assert!(items(&json!({"other": 1}), &["Appointments"]).is_empty());
    }
}
