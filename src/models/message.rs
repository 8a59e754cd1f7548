use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    FollowUp,
    Reminder,
    Tip,
    Reactivation,
    Promotion,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::FollowUp,
        MessageType::Reminder,
        MessageType::Tip,
        MessageType::Reactivation,
        MessageType::Promotion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::FollowUp => "followUp",
            MessageType::Reminder => "reminder",
            MessageType::Tip => "tip",
            MessageType::Reactivation => "reactivation",
            MessageType::Promotion => "promotion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        MessageType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered message addressed to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Email address.
    pub to: Option<String>,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Scheduled,
    Sent,
    Cancelled,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Scheduled => "scheduled",
            MessageStatus::Sent => "sent",
            MessageStatus::Cancelled => "cancelled",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => MessageStatus::Sent,
            "cancelled" => MessageStatus::Cancelled,
            "failed" => MessageStatus::Failed,
            _ => MessageStatus::Scheduled,
        }
    }

    /// Every status other than `Scheduled` is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Scheduled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: String,
    pub message: Message,
    pub scheduled_time: DateTime<FixedOffset>,
    pub status: MessageStatus,
}

/// Fields a caller may change on a message that has not gone out yet.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdit {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub to: Option<String>,
    pub phone: Option<String>,
}

impl MessageEdit {
    pub fn apply(&self, message: &mut Message) {
        if let Some(subject) = &self.subject {
            message.subject = subject.clone();
        }
        if let Some(body) = &self.body {
            message.body = body.clone();
        }
        if let Some(to) = &self.to {
            message.to = Some(to.clone());
        }
        if let Some(phone) = &self.phone {
            message.phone = Some(phone.clone());
        }
    }
}

/// The salon that owns the customer relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalonProfile {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_wire_names() {
        assert_eq!(MessageType::parse("followUp"), Some(MessageType::FollowUp));
        assert_eq!(MessageType::parse("follow_up"), None);
        let json = serde_json::to_string(&MessageType::FollowUp).unwrap();
        assert_eq!(json, "\"followUp\"");
    }

    #[test]
    fn test_only_scheduled_is_open() {
        assert!(!MessageStatus::Scheduled.is_terminal());
        assert!(MessageStatus::Sent.is_terminal());
        assert!(MessageStatus::Cancelled.is_terminal());
        assert!(MessageStatus::Failed.is_terminal());
    }
}
