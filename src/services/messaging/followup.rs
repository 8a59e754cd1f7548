use chrono::{DateTime, FixedOffset, Utc};
use rand::RngCore;

use super::templates::{render, TemplateCatalog};
use crate::errors::AppError;
use crate::models::{
    days_after, Customer, Message, MessageStatus, MessageType, SalonProfile, ScheduledMessage,
};

pub const REACTIVATION_OFFER: &str = "20% off";
pub const DEFAULT_PROMOTION: &str = "15% off your next visit";
pub const PROMOTION_VALID_DAYS: i64 = 30;

/// Offsets from the appointment start for the follow-up sequence.
const SEQUENCE: [(MessageType, i64); 3] = [
    (MessageType::FollowUp, 1),
    (MessageType::Tip, 3),
    (MessageType::Reminder, 21),
];

/// A finished appointment with the display names the templates need.
#[derive(Debug, Clone)]
pub struct CompletedVisit {
    pub appointment_id: Option<String>,
    pub start_time: DateTime<FixedOffset>,
    pub service_name: String,
    pub stylist_name: String,
}

struct Recipient {
    client_id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
}

impl Recipient {
    fn from_customer(customer: &Customer) -> Result<Self, AppError> {
        let client_id = customer
            .id
            .clone()
            .ok_or_else(|| AppError::Validation("customer has no id".to_string()))?;
        Ok(Self {
            client_id,
            name: customer.full_name().unwrap_or_else(|| "there".to_string()),
            email: customer.email.clone(),
            phone: customer.phone.clone(),
        })
    }

    fn message(
        &self,
        catalog: &TemplateCatalog,
        message_type: MessageType,
        appointment_id: Option<String>,
        data: &[(&str, &str)],
    ) -> Result<Message, AppError> {
        let template = catalog.template(message_type)?;
        Ok(Message {
            message_type,
            to: self.email.clone(),
            phone: self.phone.clone(),
            subject: render(&template.subject, data),
            body: render(&template.body, data),
            client_id: self.client_id.clone(),
            appointment_id,
        })
    }
}

/// Whole days from `start` to `now`, rounded down.
pub fn days_since(start: DateTime<FixedOffset>, now: DateTime<Utc>) -> i64 {
    (now.fixed_offset() - start).num_seconds().div_euclid(86_400)
}

/// Builds the follow-up, tip and reminder messages for a completed visit,
/// scheduled 1, 3 and 21 days after it started. `days_since` in the
/// reminder is computed from `now`, the generation time.
pub fn schedule_follow_up_sequence(
    catalog: &TemplateCatalog,
    visit: &CompletedVisit,
    customer: &Customer,
    salon: &SalonProfile,
    now: DateTime<Utc>,
    rng: &mut dyn RngCore,
) -> Result<Vec<ScheduledMessage>, AppError> {
    let recipient = Recipient::from_customer(customer)?;
    let tip = catalog.pick_tip(&visit.service_name, rng);
    let days = days_since(visit.start_time, now).to_string();

    let data = [
        ("client_name", recipient.name.as_str()),
        ("salon_name", salon.name.as_str()),
        ("stylist_name", visit.stylist_name.as_str()),
        ("service_name", visit.service_name.as_str()),
        ("tip_content", tip.as_str()),
        ("days_since", days.as_str()),
    ];

    let mut scheduled = Vec::with_capacity(SEQUENCE.len());
    for (message_type, offset_days) in SEQUENCE {
        let scheduled_time = days_after(visit.start_time, offset_days).ok_or_else(|| {
            AppError::Validation("appointment start time is out of range".to_string())
        })?;
        let message = recipient.message(catalog, message_type, visit.appointment_id.clone(), &data)?;
        scheduled.push(ScheduledMessage {
            id: uuid::Uuid::new_v4().to_string(),
            message,
            scheduled_time,
            status: MessageStatus::Scheduled,
        });
    }

    tracing::info!(
        client_id = %recipient.client_id,
        appointment_id = ?visit.appointment_id,
        "built follow-up sequence"
    );
    Ok(scheduled)
}

pub fn reactivation_message(
    catalog: &TemplateCatalog,
    customer: &Customer,
    salon: &SalonProfile,
) -> Result<Message, AppError> {
    let recipient = Recipient::from_customer(customer)?;
    let data = [
        ("client_name", recipient.name.as_str()),
        ("salon_name", salon.name.as_str()),
        ("reactivation_offer", REACTIVATION_OFFER),
    ];
    recipient.message(catalog, MessageType::Reactivation, None, &data)
}

/// `details` defaults to the standard discount. The offer expires
/// [`PROMOTION_VALID_DAYS`] after `now`.
pub fn promotion_message(
    catalog: &TemplateCatalog,
    customer: &Customer,
    salon: &SalonProfile,
    details: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Message, AppError> {
    let recipient = Recipient::from_customer(customer)?;
    let expiry = days_after(now, PROMOTION_VALID_DAYS)
        .ok_or_else(|| AppError::Validation("promotion expiry is out of range".to_string()))?
        .format("%-m/%-d/%Y")
        .to_string();
    let data = [
        ("client_name", recipient.name.as_str()),
        ("salon_name", salon.name.as_str()),
        ("promotion_details", details.unwrap_or(DEFAULT_PROMOTION)),
        ("expiry_date", expiry.as_str()),
    ];
    recipient.message(catalog, MessageType::Promotion, None, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, PlatformData};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn customer() -> Customer {
        Customer {
            id: Some("client-7".to_string()),
            first_name: Some("Maya".to_string()),
            last_name: Some("Chen".to_string()),
            email: Some("maya@example.com".to_string()),
            phone: Some("555-0102".to_string()),
            platform_data: PlatformData::new(Platform::Vagaro, Some("client-7".to_string())),
        }
    }

    fn visit() -> CompletedVisit {
        CompletedVisit {
            appointment_id: Some("appt-1".to_string()),
            start_time: DateTime::parse_from_rfc3339("2024-01-25T14:00:00Z").unwrap(),
            service_name: "Color Gloss".to_string(),
            stylist_name: "Jordan".to_string(),
        }
    }

    fn salon() -> SalonProfile {
        SalonProfile {
            name: "Luxe Salon".to_string(),
        }
    }

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_sequence_times_and_types() {
        let messages = schedule_follow_up_sequence(
            &TemplateCatalog::default(),
            &visit(),
            &customer(),
            &salon(),
            at("2024-01-25T18:00:00Z"),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        let plan: Vec<(MessageType, String)> = messages
            .iter()
            .map(|m| (m.message.message_type, m.scheduled_time.to_rfc3339()))
            .collect();
        assert_eq!(
            plan,
            vec![
                (MessageType::FollowUp, "2024-01-26T14:00:00+00:00".to_string()),
                (MessageType::Tip, "2024-01-28T14:00:00+00:00".to_string()),
                (MessageType::Reminder, "2024-02-15T14:00:00+00:00".to_string()),
            ]
        );
        assert!(messages.iter().all(|m| m.status == MessageStatus::Scheduled));
        assert!(messages.iter().all(|m| m.message.client_id == "client-7"));
        assert!(messages.iter().all(|m| m.message.appointment_id.as_deref() == Some("appt-1")));
    }

    #[test]
    fn test_sequence_renders_names() {
        let messages = schedule_follow_up_sequence(
            &TemplateCatalog::default(),
            &visit(),
            &customer(),
            &salon(),
            at("2024-01-30T09:00:00Z"),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        let follow_up = &messages[0].message;
        assert!(follow_up.body.starts_with("Hi Maya Chen,"));
        assert!(follow_up.body.contains("How was your experience with Jordan?"));
        assert!(follow_up.body.ends_with("The Luxe Salon Team"));
        assert_eq!(follow_up.to.as_deref(), Some("maya@example.com"));

        let tip = &messages[1].message;
        let catalog = TemplateCatalog::default();
        let color_tips = &catalog.tip_category("Color").unwrap().tips;
        assert!(color_tips.iter().any(|t| tip.body.contains(t.as_str())));

        let reminder = &messages[2].message;
        assert!(reminder.body.contains("It's been about 4 days since your last appointment"));
        assert!(reminder.body.contains("Your Color Gloss might be due"));
    }

    #[test]
    fn test_days_since_floors() {
        let start = DateTime::parse_from_rfc3339("2024-01-25T14:00:00Z").unwrap();
        assert_eq!(days_since(start, at("2024-01-26T13:59:00Z")), 0);
        assert_eq!(days_since(start, at("2024-01-26T14:00:00Z")), 1);
        assert_eq!(days_since(start, at("2024-01-25T13:00:00Z")), -1);
    }

    #[test]
    fn test_customer_without_id_is_rejected() {
        let mut anonymous = customer();
        anonymous.id = None;
        let err = reactivation_message(&TemplateCatalog::default(), &anonymous, &salon()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_reactivation_message() {
        let message = reactivation_message(&TemplateCatalog::default(), &customer(), &salon()).unwrap();
        assert_eq!(message.subject, "We miss you at Luxe Salon!");
        assert!(message.body.contains("offer you 20% off on your next visit"));
        assert_eq!(message.appointment_id, None);
    }

    #[test]
    fn test_promotion_defaults() {
        let message = promotion_message(
            &TemplateCatalog::default(),
            &customer(),
            &salon(),
            None,
            at("2024-01-25T10:00:00Z"),
        )
        .unwrap();
        assert_eq!(message.subject, "Special offer just for you!");
        assert!(message.body.contains("special promotion: 15% off your next visit"));
        assert!(message.body.contains("valid until 2/24/2024."));
    }

    #[test]
    fn test_dates_past_calendar_end_are_rejected() {
        let err = promotion_message(
            &TemplateCatalog::default(),
            &customer(),
            &salon(),
            None,
            DateTime::<Utc>::MAX_UTC,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut late = visit();
        late.start_time = DateTime::<Utc>::MAX_UTC.fixed_offset();
        let err = schedule_follow_up_sequence(
            &TemplateCatalog::default(),
            &late,
            &customer(),
            &salon(),
            at("2024-01-25T10:00:00Z"),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
