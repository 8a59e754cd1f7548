use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use super::MessageSender;
use crate::db::queries;
use crate::errors::AppError;

const BATCH_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    /// Messages cancelled or edited away between the query and the send.
    pub skipped: usize,
}

/// Sends every message due at `now` and records the outcome. The database
/// lock is never held while a send is in flight.
pub async fn deliver_due(
    db: &Arc<Mutex<Connection>>,
    sender: &dyn MessageSender,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, AppError> {
    let due = {
        let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::due_messages(&conn, &now, BATCH_SIZE)?
    };

    let mut report = DeliveryReport::default();
    for scheduled in due {
        // A cancel may have landed since the batch was read.
        let still_scheduled = {
            let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
            queries::get_scheduled_message(&conn, &scheduled.id)?
                .map(|m| !m.status.is_terminal())
                .unwrap_or(false)
        };
        if !still_scheduled {
            report.skipped += 1;
            continue;
        }

        let result = sender.send(&scheduled.message).await;
        let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(()) => {
                if queries::mark_sent(&conn, &scheduled.id)? {
                    report.sent += 1;
                } else {
                    report.skipped += 1;
                }
            }
            Err(e) => {
                tracing::error!(id = %scheduled.id, error = %e, "failed to send scheduled message");
                if queries::mark_failed(&conn, &scheduled.id)? {
                    report.failed += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }
    }

    if report.sent + report.failed > 0 {
        tracing::info!(sent = report.sent, failed = report.failed, "delivered scheduled messages");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Message, MessageStatus, MessageType, ScheduledMessage};
    use async_trait::async_trait;

    struct EmailOnlySender;

    #[async_trait]
    impl MessageSender for EmailOnlySender {
        async fn send(&self, message: &Message) -> anyhow::Result<()> {
            anyhow::ensure!(message.to.is_some(), "no email address");
            Ok(())
        }
    }

    fn scheduled(id: &str, to: Option<&str>, at: &str) -> ScheduledMessage {
        ScheduledMessage {
            id: id.to_string(),
            message: Message {
                message_type: MessageType::Tip,
                to: to.map(str::to_string),
                phone: Some("555-0100".to_string()),
                subject: "A tip for maintaining your style".to_string(),
                body: "body".to_string(),
                client_id: "c1".to_string(),
                appointment_id: None,
            },
            scheduled_time: DateTime::parse_from_rfc3339(at).unwrap(),
            status: MessageStatus::Scheduled,
        }
    }

    #[tokio::test]
    async fn test_deliver_due_marks_outcomes() {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_scheduled_messages(
            &conn,
            &[
                scheduled("ok", Some("a@example.com"), "2024-01-26T10:00:00Z"),
                scheduled("bad", None, "2024-01-26T11:00:00Z"),
                scheduled("later", Some("a@example.com"), "2024-02-26T10:00:00Z"),
            ],
        )
        .unwrap();
        let db = Arc::new(Mutex::new(conn));

        let now = DateTime::parse_from_rfc3339("2024-01-27T00:00:00Z").unwrap().with_timezone(&Utc);
        let report = deliver_due(&db, &EmailOnlySender, now).await.unwrap();
        assert_eq!(report, DeliveryReport { sent: 1, failed: 1, skipped: 0 });

        let conn = db.lock().unwrap();
        let status = |id: &str| queries::get_scheduled_message(&conn, id).unwrap().unwrap().status;
        assert_eq!(status("ok"), MessageStatus::Sent);
        assert_eq!(status("bad"), MessageStatus::Failed);
        assert_eq!(status("later"), MessageStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_second_tick_sends_nothing() {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_scheduled_message(&conn, &scheduled("ok", Some("a@example.com"), "2024-01-26T10:00:00Z"))
            .unwrap();
        let db = Arc::new(Mutex::new(conn));
        let now = DateTime::parse_from_rfc3339("2024-01-27T00:00:00Z").unwrap().with_timezone(&Utc);

        deliver_due(&db, &EmailOnlySender, now).await.unwrap();
        let report = deliver_due(&db, &EmailOnlySender, now).await.unwrap();
        assert_eq!(report, DeliveryReport::default());
    }
}
