//! Database row types. These map directly to SQLite rows and stay distinct
//! from the bloodlink-types models; the `TryFrom` impls do the parsing.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use bloodlink_types::models::{BloodRequest, Conversation, LastMessage, Message, User};

/// Fixed-width RFC 3339, so text ordering in SQL equals time ordering.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') form, without timezone
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt {} '{}'", what, raw))
}

fn parse_opt_uuid(raw: Option<&str>, what: &str) -> Result<Option<Uuid>> {
    raw.map(|r| parse_uuid(r, what)).transpose()
}

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub blood_group: String,
    pub location: String,
    pub state: Option<String>,
    pub lga: Option<String>,
    pub role: String,
    pub is_available: bool,
    pub created_at: String,
}

impl TryFrom<&UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: &UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.id, "user id")?,
            name: row.name.clone(),
            email: row.email.clone(),
            blood_group: row.blood_group.parse()?,
            location: row.location.clone(),
            state: row.state.clone(),
            lga: row.lga.clone(),
            role: row.role.parse()?,
            is_available: row.is_available,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

pub struct RequestRow {
    pub id: String,
    pub user_id: String,
    pub donor_id: Option<String>,
    pub blood_group: String,
    pub hospital: String,
    pub location: String,
    pub patient_name: Option<String>,
    pub notes: Option<String>,
    pub urgency: String,
    pub units_required: u32,
    pub status: String,
    pub responded_by: Option<String>,
    pub responded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<RequestRow> for BloodRequest {
    type Error = anyhow::Error;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(BloodRequest {
            id: parse_uuid(&row.id, "request id")?,
            user_id: parse_uuid(&row.user_id, "request owner")?,
            donor_id: parse_opt_uuid(row.donor_id.as_deref(), "target donor")?,
            blood_group: row.blood_group.parse()?,
            hospital: row.hospital,
            location: row.location,
            patient_name: row.patient_name,
            notes: row.notes,
            urgency: row.urgency.parse()?,
            units_required: row.units_required,
            status: row.status.parse()?,
            responded_by: parse_opt_uuid(row.responded_by.as_deref(), "responder")?,
            responded_at: row.responded_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

pub struct ConversationRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub name_a: String,
    pub name_b: String,
    pub last_text: Option<String>,
    pub last_sender: Option<String>,
    pub last_sender_name: Option<String>,
    pub last_timestamp: Option<String>,
    pub last_read: Option<bool>,
    pub last_read_at: Option<String>,
    pub last_updated: String,
    pub created_at: String,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = anyhow::Error;

    fn try_from(row: ConversationRow) -> Result<Self> {
        let last_message = match (row.last_text, row.last_sender, row.last_timestamp) {
            (Some(text), Some(sender), Some(timestamp)) => Some(LastMessage {
                text,
                sender: parse_uuid(&sender, "last sender")?,
                sender_name: row.last_sender_name.unwrap_or_default(),
                timestamp: parse_timestamp(&timestamp)?,
                read: row.last_read.unwrap_or(false),
                read_at: row.last_read_at.as_deref().map(parse_timestamp).transpose()?,
            }),
            (None, None, None) => None,
            _ => return Err(anyhow!("conversation {} has partial last message", row.id)),
        };

        Ok(Conversation {
            id: parse_uuid(&row.id, "conversation id")?,
            participants: [
                parse_uuid(&row.participant_a, "participant")?,
                parse_uuid(&row.participant_b, "participant")?,
            ],
            participant_names: [row.name_a, row.name_b],
            last_message,
            last_updated: parse_timestamp(&row.last_updated)?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub text: String,
    pub sender: String,
    pub sender_name: String,
    pub timestamp: String,
    pub read: bool,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_uuid(&row.id, "message id")?,
            conversation_id: parse_uuid(&row.conversation_id, "conversation id")?,
            text: row.text,
            sender: parse_uuid(&row.sender, "sender")?,
            sender_name: row.sender_name,
            timestamp: parse_timestamp(&row.timestamp)?,
            read: row.read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_as_text() {
        let early = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(parse_timestamp(&format_timestamp(late)).unwrap(), late);
    }

    #[test]
    fn sqlite_datetime_form_is_accepted() {
        let ts = parse_timestamp("2026-03-04 05:06:07").unwrap();
        assert_eq!(format_timestamp(ts), "2026-03-04T05:06:07.000000Z");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
