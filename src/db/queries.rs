use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::AppError;
use crate::models::{Message, MessageEdit, MessageStatus, MessageType, ScheduledMessage};

const COLUMNS: &str = "id, client_id, appointment_id, message_type, recipient_email, recipient_phone, \
                       subject, body, scheduled_time, status";

fn utc_key(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Scheduled messages ──

pub fn insert_scheduled_message(conn: &Connection, scheduled: &ScheduledMessage) -> Result<(), AppError> {
    let message = &scheduled.message;
    conn.execute(
        "INSERT INTO scheduled_messages (id, client_id, appointment_id, message_type, recipient_email, \
         recipient_phone, subject, body, scheduled_time, scheduled_at_utc, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            scheduled.id,
            message.client_id,
            message.appointment_id,
            message.message_type.as_str(),
            message.to,
            message.phone,
            message.subject,
            message.body,
            scheduled.scheduled_time.to_rfc3339(),
            utc_key(&scheduled.scheduled_time.with_timezone(&Utc)),
            scheduled.status.as_str(),
        ],
    )?;
    Ok(())
}

/// Stores a whole sequence or none of it.
pub fn insert_scheduled_messages(conn: &Connection, messages: &[ScheduledMessage]) -> Result<(), AppError> {
    let tx = conn.unchecked_transaction()?;
    for scheduled in messages {
        insert_scheduled_message(&tx, scheduled)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_scheduled_message(conn: &Connection, id: &str) -> Result<Option<ScheduledMessage>, AppError> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM scheduled_messages WHERE id = ?1"),
            params![id],
            |row| Ok(parse_scheduled_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub fn list_for_client(conn: &Connection, client_id: &str) -> Result<Vec<ScheduledMessage>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM scheduled_messages WHERE client_id = ?1 ORDER BY scheduled_at_utc ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![client_id], |row| Ok(parse_scheduled_row(row)))?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

/// Scheduled messages whose send time is at or before `now`, oldest first.
pub fn due_messages(conn: &Connection, now: &DateTime<Utc>, limit: i64) -> Result<Vec<ScheduledMessage>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM scheduled_messages
         WHERE status = 'scheduled' AND scheduled_at_utc <= ?1
         ORDER BY scheduled_at_utc ASC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![utc_key(now), limit], |row| Ok(parse_scheduled_row(row)))?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

/// Moves a scheduled message to `status`. Returns false when the message is
/// missing or already left the scheduled state.
fn transition(conn: &Connection, id: &str, status: MessageStatus) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE scheduled_messages SET status = ?1, updated_at = datetime('now')
         WHERE id = ?2 AND status = 'scheduled'",
        params![status.as_str(), id],
    )?;
    Ok(count > 0)
}

/// Resolves why a conditional update touched no row.
fn rejected_transition(conn: &Connection, id: &str) -> AppError {
    match get_scheduled_message(conn, id) {
        Ok(Some(existing)) => AppError::InvalidTransition {
            id: id.to_string(),
            status: existing.status.as_str().to_string(),
        },
        Ok(None) => AppError::NotFound(format!("scheduled message {id}")),
        Err(e) => e,
    }
}

/// Cancelling an already cancelled message is a no-op. Sent and failed
/// messages cannot be cancelled.
pub fn cancel_scheduled_message(conn: &Connection, id: &str) -> Result<ScheduledMessage, AppError> {
    if !transition(conn, id, MessageStatus::Cancelled)? {
        match get_scheduled_message(conn, id)? {
            Some(existing) if existing.status == MessageStatus::Cancelled => return Ok(existing),
            _ => return Err(rejected_transition(conn, id)),
        }
    }
    get_scheduled_message(conn, id)?.ok_or_else(|| AppError::NotFound(format!("scheduled message {id}")))
}

/// Applies `edit` to a message that is still scheduled. The write is
/// conditional on the status, so an edit racing a cancel or a send loses.
pub fn edit_scheduled_message(conn: &Connection, id: &str, edit: &MessageEdit) -> Result<ScheduledMessage, AppError> {
    let mut scheduled = get_scheduled_message(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("scheduled message {id}")))?;
    edit.apply(&mut scheduled.message);

    let message = &scheduled.message;
    let count = conn.execute(
        "UPDATE scheduled_messages
         SET subject = ?1, body = ?2, recipient_email = ?3, recipient_phone = ?4, updated_at = datetime('now')
         WHERE id = ?5 AND status = 'scheduled'",
        params![message.subject, message.body, message.to, message.phone, id],
    )?;
    if count == 0 {
        return Err(rejected_transition(conn, id));
    }
    Ok(scheduled)
}

pub fn mark_sent(conn: &Connection, id: &str) -> Result<bool, AppError> {
    transition(conn, id, MessageStatus::Sent)
}

pub fn mark_failed(conn: &Connection, id: &str) -> Result<bool, AppError> {
    transition(conn, id, MessageStatus::Failed)
}

fn parse_scheduled_row(row: &rusqlite::Row) -> Result<ScheduledMessage, AppError> {
    let id: String = row.get(0)?;
    let client_id: String = row.get(1)?;
    let appointment_id: Option<String> = row.get(2)?;
    let type_str: String = row.get(3)?;
    let to: Option<String> = row.get(4)?;
    let phone: Option<String> = row.get(5)?;
    let subject: String = row.get(6)?;
    let body: String = row.get(7)?;
    let scheduled_time_str: String = row.get(8)?;
    let status_str: String = row.get(9)?;

    let message_type = MessageType::parse(&type_str)
        .ok_or_else(|| AppError::Normalization(format!("unknown message type {type_str} on {id}")))?;
    let scheduled_time = DateTime::parse_from_rfc3339(&scheduled_time_str)
        .map_err(|e| AppError::Normalization(format!("bad scheduled_time on {id}: {e}")))?;

    Ok(ScheduledMessage {
        id,
        message: Message {
            message_type,
            to,
            phone,
            subject,
            body,
            client_id,
            appointment_id,
        },
        scheduled_time,
        status: MessageStatus::parse(&status_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn scheduled(id: &str, client_id: &str, at: &str) -> ScheduledMessage {
        ScheduledMessage {
            id: id.to_string(),
            message: Message {
                message_type: MessageType::FollowUp,
                to: Some("client@example.com".to_string()),
                phone: None,
                subject: "How was your recent appointment?".to_string(),
                body: "Hi there".to_string(),
                client_id: client_id.to_string(),
                appointment_id: Some("appt-1".to_string()),
            },
            scheduled_time: DateTime::parse_from_rfc3339(at).unwrap(),
            status: MessageStatus::Scheduled,
        }
    }

    fn setup() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    #[test]
    fn test_insert_and_list_in_send_order() {
        let conn = setup();
        insert_scheduled_messages(
            &conn,
            &[
                scheduled("m2", "c1", "2024-02-15T14:00:00Z"),
                scheduled("m1", "c1", "2024-01-26T14:00:00-05:00"),
                scheduled("m3", "c2", "2024-01-27T14:00:00Z"),
            ],
        )
        .unwrap();

        let listed = list_for_client(&conn, "c1").unwrap();
        let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(listed[0].scheduled_time.to_rfc3339(), "2024-01-26T14:00:00-05:00");
        assert_eq!(listed[0].message.appointment_id.as_deref(), Some("appt-1"));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let conn = setup();
        insert_scheduled_message(&conn, &scheduled("m1", "c1", "2024-01-26T14:00:00Z")).unwrap();

        let first = cancel_scheduled_message(&conn, "m1").unwrap();
        let second = cancel_scheduled_message(&conn, "m1").unwrap();
        assert_eq!(first.status, MessageStatus::Cancelled);
        assert_eq!(first, second);
    }

    #[test]
    fn test_sent_message_cannot_change() {
        let conn = setup();
        insert_scheduled_message(&conn, &scheduled("m1", "c1", "2024-01-26T14:00:00Z")).unwrap();
        assert!(mark_sent(&conn, "m1").unwrap());

        let err = cancel_scheduled_message(&conn, "m1").unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { ref status, .. } if status == "sent"));

        let edit = MessageEdit {
            body: Some("changed".to_string()),
            ..Default::default()
        };
        let err = edit_scheduled_message(&conn, "m1", &edit).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        assert!(!mark_failed(&conn, "m1").unwrap());
        let stored = get_scheduled_message(&conn, "m1").unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.message.body, "Hi there");
    }

    #[test]
    fn test_edit_updates_only_given_fields() {
        let conn = setup();
        insert_scheduled_message(&conn, &scheduled("m1", "c1", "2024-01-26T14:00:00Z")).unwrap();

        let edit = MessageEdit {
            subject: Some("Quick check-in".to_string()),
            phone: Some("555-0199".to_string()),
            ..Default::default()
        };
        let edited = edit_scheduled_message(&conn, "m1", &edit).unwrap();
        assert_eq!(edited.message.subject, "Quick check-in");
        assert_eq!(edited.message.body, "Hi there");
        assert_eq!(edited.message.phone.as_deref(), Some("555-0199"));

        let stored = get_scheduled_message(&conn, "m1").unwrap().unwrap();
        assert_eq!(stored, edited);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let conn = setup();
        assert!(matches!(cancel_scheduled_message(&conn, "nope"), Err(AppError::NotFound(_))));
        assert!(matches!(
            edit_scheduled_message(&conn, "nope", &MessageEdit::default()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_due_messages_compares_in_utc() {
        let conn = setup();
        insert_scheduled_messages(
            &conn,
            &[
                // 19:00 UTC
                scheduled("m1", "c1", "2024-01-26T14:00:00-05:00"),
                scheduled("m2", "c1", "2024-01-26T18:00:00Z"),
                scheduled("m3", "c1", "2024-01-26T20:00:00Z"),
            ],
        )
        .unwrap();
        cancel_scheduled_message(&conn, "m2").unwrap();

        let now = DateTime::parse_from_rfc3339("2024-01-26T19:30:00Z").unwrap().with_timezone(&Utc);
        let due = due_messages(&conn, &now, 10).unwrap();
        let ids: Vec<&str> = due.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1"]);
    }
}
