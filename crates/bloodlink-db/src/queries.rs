use crate::Database;
use crate::models::{
    ConversationRow, MessageRow, RequestRow, UserRow, format_timestamp,
};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::debug;
use uuid::Uuid;

use bloodlink_types::models::{
    BloodGroup, BloodRequest, Conversation, Message, RequestStatus, Role, Urgency, User, pair_key,
};

const USER_COLUMNS: &str =
    "id, name, email, password, blood_group, location, state, lga, role, is_available, created_at";

const REQUEST_COLUMNS: &str = "id, user_id, donor_id, blood_group, hospital, location, patient_name, \
     notes, urgency, units_required, status, responded_by, responded_at, created_at, updated_at";

const CONVERSATION_COLUMNS: &str = "id, participant_a, participant_b, name_a, name_b, last_text, \
     last_sender, last_sender_name, last_timestamp, last_read, last_read_at, last_updated, created_at";

pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub blood_group: BloodGroup,
    pub location: String,
    pub state: Option<String>,
    pub lga: Option<String>,
    pub role: Role,
    pub is_available: bool,
}

pub struct NewRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub donor_id: Option<Uuid>,
    pub blood_group: BloodGroup,
    pub hospital: String,
    pub location: String,
    pub patient_name: Option<String>,
    pub notes: Option<String>,
    pub urgency: Urgency,
    pub units_required: u32,
}

/// Equality filters for [`Database::list_requests`]. `None` fields match anything.
#[derive(Debug, Default, Clone)]
pub struct RequestFilter {
    pub owner: Option<Uuid>,
    pub donor: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub blood_group: Option<BloodGroup>,
    /// Only requests on the open board (no target donor).
    pub untargeted: bool,
}

#[derive(Debug)]
pub enum RespondOutcome {
    Updated(BloodRequest),
    /// Someone already answered; carries the current state.
    NotOpen(BloodRequest),
    NotFound,
}

impl Database {
    // -- Users --

    /// Returns `None` when the email is already registered. The UNIQUE
    /// email column decides, so concurrent signups cannot both succeed.
    pub fn create_user(&self, user: &NewUser) -> Result<Option<User>> {
        let created_at = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, blood_group, location, state, lga, role, is_available, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    user.id.to_string(),
                    user.name,
                    user.email,
                    user.password_hash,
                    user.blood_group.as_str(),
                    user.location,
                    user.state,
                    user.lga,
                    user.role.as_str(),
                    user.is_available,
                    created_at,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    debug!("Signup for {} lost to an existing account", user.email);
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
            let row = query_user(conn, "id", &user.id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", user.id))?;
            User::try_from(&row).map(Some)
        })
    }

    /// Lookup for login; the row carries the password hash.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            query_user(conn, "id", &id.to_string())?
                .as_ref()
                .map(User::try_from)
                .transpose()
        })
    }

    /// Donors with the given blood group, optionally narrowed to one exact
    /// location string.
    pub fn search_donors(&self, blood_group: BloodGroup, location: Option<&str>) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE role = 'donor' AND blood_group = ?1 AND (?2 IS NULL OR location = ?2)
                 ORDER BY name, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![blood_group.as_str(), location], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.iter().map(User::try_from).collect()
        })
    }

    pub fn available_donors(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE role = 'donor' AND is_available = 1
                 ORDER BY name, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.iter().map(User::try_from).collect()
        })
    }

    /// Returns false when the user does not exist.
    pub fn set_availability(&self, id: Uuid, is_available: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_available = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), is_available],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at) VALUES (?1, ?2, ?3)",
                (id.to_string(), user_id.to_string(), format_timestamp(Utc::now())),
            )?;
            Ok(())
        })
    }

    pub fn session_active(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM sessions WHERE id = ?1 AND user_id = ?2",
                    (id.to_string(), user_id.to_string()),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn delete_session(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
            Ok(changed == 1)
        })
    }

    // -- Requests --

    pub fn insert_request(&self, req: &NewRequest) -> Result<BloodRequest> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO requests (id, user_id, donor_id, blood_group, hospital, location, patient_name,
                                       notes, urgency, units_required, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'open', ?11, ?11)",
                rusqlite::params![
                    req.id.to_string(),
                    req.user_id.to_string(),
                    req.donor_id.map(|d| d.to_string()),
                    req.blood_group.as_str(),
                    req.hospital,
                    req.location,
                    req.patient_name,
                    req.notes,
                    req.urgency.as_str(),
                    req.units_required,
                    now,
                ],
            )?;
            query_request(conn, req.id)?
                .ok_or_else(|| anyhow::anyhow!("request {} vanished after insert", req.id))
        })
    }

    pub fn get_request(&self, id: Uuid) -> Result<Option<BloodRequest>> {
        self.with_conn(|conn| query_request(conn, id))
    }

    /// Newest first.
    pub fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<BloodRequest>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM requests
                 WHERE (?1 IS NULL OR user_id = ?1)
                   AND (?2 IS NULL OR donor_id = ?2)
                   AND (?3 IS NULL OR status = ?3)
                   AND (?4 IS NULL OR blood_group = ?4)
                   AND (?5 = 0 OR donor_id IS NULL)
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        filter.owner.map(|u| u.to_string()),
                        filter.donor.map(|u| u.to_string()),
                        filter.status.map(RequestStatus::as_str),
                        filter.blood_group.map(BloodGroup::as_str),
                        filter.untargeted,
                    ],
                    request_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(BloodRequest::try_from).collect()
        })
    }

    /// Move an open request to `status`. The write only succeeds while the
    /// row is still open, so exactly one responder wins.
    pub fn respond_request(
        &self,
        id: Uuid,
        status: RequestStatus,
        responder: Uuid,
    ) -> Result<RespondOutcome> {
        if !RequestStatus::Open.can_transition_to(status) {
            bail!("invalid request transition open -> {}", status);
        }

        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE requests
                 SET status = ?2, responded_by = ?3, responded_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status = 'open'",
                rusqlite::params![id.to_string(), status.as_str(), responder.to_string(), now],
            )?;
            let current = query_request(&tx, id)?;
            tx.commit()?;

            Ok(match (changed, current) {
                (1, Some(req)) => RespondOutcome::Updated(req),
                (_, Some(req)) => RespondOutcome::NotOpen(req),
                (_, None) => RespondOutcome::NotFound,
            })
        })
    }

    // -- Conversations --

    /// Fetch the conversation for the unordered pair, creating it if absent.
    /// Returns `(conversation, created)`.
    pub fn get_or_create_conversation(
        &self,
        initiator: (Uuid, &str),
        other: (Uuid, &str),
    ) -> Result<(Conversation, bool)> {
        if initiator.0 == other.0 {
            bail!("conversation needs two distinct participants");
        }

        let key = pair_key(initiator.0, other.0);
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO conversations (id, pair_key, participant_a, participant_b, name_a, name_b, last_updated, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(pair_key) DO NOTHING",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    key,
                    initiator.0.to_string(),
                    other.0.to_string(),
                    initiator.1,
                    other.1,
                    now,
                ],
            )?;

            let conversation = query_conversation(conn, "pair_key", &key)?
                .ok_or_else(|| anyhow::anyhow!("conversation {} missing after upsert", key))?;
            Ok((conversation, changed == 1))
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, "id", &id.to_string()))
    }

    /// Most recently updated first.
    pub fn conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE participant_a = ?1 OR participant_b = ?1
                 ORDER BY last_updated DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Conversation::try_from).collect()
        })
    }

    // -- Messages --

    /// Append a message and make it the conversation's unread last message.
    pub fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
        sender_name: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<Message> {
        let id = Uuid::new_v4();
        let timestamp = format_timestamp(at);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, text, sender, sender_name, timestamp, read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                rusqlite::params![
                    id.to_string(),
                    conversation_id.to_string(),
                    text,
                    sender.to_string(),
                    sender_name,
                    timestamp,
                ],
            )?;
            let changed = tx.execute(
                "UPDATE conversations
                 SET last_text = ?2, last_sender = ?3, last_sender_name = ?4, last_timestamp = ?5,
                     last_read = 0, last_read_at = NULL, last_updated = ?5
                 WHERE id = ?1",
                rusqlite::params![conversation_id.to_string(), text, sender.to_string(), sender_name, timestamp],
            )?;
            if changed != 1 {
                bail!("conversation {} not found", conversation_id);
            }
            tx.commit()?;

            Ok(Message {
                id,
                conversation_id,
                text: text.to_string(),
                sender,
                sender_name: sender_name.to_string(),
                timestamp: at,
                read: false,
            })
        })
    }

    /// Oldest first.
    pub fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, text, sender, sender_name, timestamp, read
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id.to_string()], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        text: row.get(2)?,
                        sender: row.get(3)?,
                        sender_name: row.get(4)?,
                        timestamp: row.get(5)?,
                        read: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Message::try_from).collect()
        })
    }

    /// Flag the last message as read by `reader`. Only applies when someone
    /// else sent it and it is still unread; returns whether anything changed.
    pub fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<bool> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET last_read = 1, last_read_at = ?3
                 WHERE id = ?1 AND last_sender IS NOT NULL AND last_sender != ?2 AND last_read = 0",
                rusqlite::params![conversation_id.to_string(), reader.to_string(), now],
            )?;
            Ok(changed == 1)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        blood_group: row.get(4)?,
        location: row.get(5)?,
        state: row.get(6)?,
        lga: row.get(7)?,
        role: row.get(8)?,
        is_available: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        donor_id: row.get(2)?,
        blood_group: row.get(3)?,
        hospital: row.get(4)?,
        location: row.get(5)?,
        patient_name: row.get(6)?,
        notes: row.get(7)?,
        urgency: row.get(8)?,
        units_required: row.get(9)?,
        status: row.get(10)?,
        responded_by: row.get(11)?,
        responded_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        name_a: row.get(3)?,
        name_b: row.get(4)?,
        last_text: row.get(5)?,
        last_sender: row.get(6)?,
        last_sender_name: row.get(7)?,
        last_timestamp: row.get(8)?,
        last_read: row.get(9)?,
        last_read_at: row.get(10)?,
        last_updated: row.get(11)?,
        created_at: row.get(12)?,
    })
}

/// `column` is always one of our own literals, never user input.
fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn query_request(conn: &Connection, id: Uuid) -> Result<Option<BloodRequest>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], request_from_row)
        .optional()?
        .map(BloodRequest::try_from)
        .transpose()
}

fn query_conversation(conn: &Connection, column: &str, value: &str) -> Result<Option<Conversation>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE {column} = ?1");
    conn.query_row(&sql, [value], conversation_from_row)
        .optional()?
        .map(Conversation::try_from)
        .transpose()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(db: &Database, name: &str, group: BloodGroup, location: &str, role: Role) -> User {
        db.create_user(&NewUser {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: "hash".to_string(),
            blood_group: group,
            location: location.to_string(),
            state: None,
            lga: None,
            role,
            is_available: role == Role::Donor,
        })
        .unwrap()
        .unwrap()
    }

    fn new_request(db: &Database, owner: Uuid, hospital: &str, donor: Option<Uuid>) -> BloodRequest {
        db.insert_request(&NewRequest {
            id: Uuid::new_v4(),
            user_id: owner,
            donor_id: donor,
            blood_group: BloodGroup::ONegative,
            hospital: hospital.to_string(),
            location: "Ikeja, Lagos".to_string(),
            patient_name: None,
            notes: None,
            urgency: Urgency::Emergency,
            units_required: 2,
        })
        .unwrap()
    }

    #[test]
    fn donor_search_is_exact_match() {
        let db = Database::open_in_memory().unwrap();
        new_user(&db, "Ada", BloodGroup::ONegative, "Ikeja, Lagos", Role::Donor);
        new_user(&db, "Bola", BloodGroup::ONegative, "Kano", Role::Donor);
        new_user(&db, "Chi", BloodGroup::APositive, "Ikeja, Lagos", Role::Donor);
        new_user(&db, "Dayo", BloodGroup::ONegative, "Ikeja, Lagos", Role::Recipient);

        let lagos = db.search_donors(BloodGroup::ONegative, Some("Ikeja, Lagos")).unwrap();
        assert_eq!(lagos.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(), ["Ada"]);

        // no location widens the result set
        let all = db.search_donors(BloodGroup::ONegative, None).unwrap();
        assert_eq!(all.len(), 2);

        assert!(db.search_donors(BloodGroup::ONegative, Some("ikeja, lagos")).unwrap().is_empty());
    }

    #[test]
    fn availability_filters_donor_list() {
        let db = Database::open_in_memory().unwrap();
        let ada = new_user(&db, "Ada", BloodGroup::BPositive, "Kano", Role::Donor);
        new_user(&db, "Bola", BloodGroup::BPositive, "Kano", Role::Donor);
        assert_eq!(db.available_donors().unwrap().len(), 2);

        assert!(db.set_availability(ada.id, false).unwrap());
        let names: Vec<_> = db.available_donors().unwrap().into_iter().map(|u| u.name).collect();
        assert_eq!(names, ["Bola"]);
        assert!(!db.set_availability(Uuid::new_v4(), true).unwrap());
    }

    #[test]
    fn email_lookup_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        new_user(&db, "Ada", BloodGroup::BPositive, "Kano", Role::Requester);
        let row = db.get_user_by_email("ADA@example.com").unwrap().unwrap();
        assert_eq!(row.role, "requester");
    }

    #[test]
    fn duplicate_email_is_reported_not_failed() {
        let db = Database::open_in_memory().unwrap();
        let ada = new_user(&db, "Ada", BloodGroup::BPositive, "Kano", Role::Donor);

        let again = db
            .create_user(&NewUser {
                id: Uuid::new_v4(),
                name: "Other Ada".to_string(),
                email: "ADA@Example.com".to_string(),
                password_hash: "hash".to_string(),
                blood_group: BloodGroup::APositive,
                location: "Abuja".to_string(),
                state: None,
                lga: None,
                role: Role::Recipient,
                is_available: false,
            })
            .unwrap();
        assert!(again.is_none());
        assert_eq!(db.get_user(ada.id).unwrap().unwrap().name, "Ada");
    }

    #[test]
    fn conversation_is_unique_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ada", BloodGroup::ONegative, "Kano", Role::Donor);
        let b = new_user(&db, "Bola", BloodGroup::ONegative, "Kano", Role::Recipient);

        let (first, created) = db.get_or_create_conversation((a.id, "Ada"), (b.id, "Bola")).unwrap();
        assert!(created);
        let (again, created) = db.get_or_create_conversation((a.id, "Ada"), (b.id, "Bola")).unwrap();
        assert!(!created);
        let (reversed, created) = db.get_or_create_conversation((b.id, "Bola"), (a.id, "Ada")).unwrap();
        assert!(!created);

        assert_eq!(first.id, again.id);
        assert_eq!(first.id, reversed.id);
        assert_eq!(first.participants, [a.id, b.id]);
        assert_eq!(db.conversations_for_user(a.id).unwrap().len(), 1);
        assert_eq!(db.conversations_for_user(b.id).unwrap().len(), 1);

        assert!(db.get_or_create_conversation((a.id, "Ada"), (a.id, "Ada")).is_err());
    }

    #[test]
    fn messages_update_last_message_and_read_state() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ada", BloodGroup::ONegative, "Kano", Role::Donor);
        let b = new_user(&db, "Bola", BloodGroup::ONegative, "Kano", Role::Recipient);
        let (convo, _) = db.get_or_create_conversation((a.id, "Ada"), (b.id, "Bola")).unwrap();

        // nothing to mark on an empty conversation
        assert!(!db.mark_read(convo.id, b.id).unwrap());

        let t0 = Utc::now();
        db.append_message(convo.id, a.id, "Ada", "hello", t0).unwrap();
        db.append_message(convo.id, a.id, "Ada", "are you free?", t0 + chrono::Duration::seconds(1))
            .unwrap();

        let msgs = db.get_messages(convo.id).unwrap();
        assert_eq!(msgs.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), ["hello", "are you free?"]);

        let stored = db.get_conversation(convo.id).unwrap().unwrap();
        assert!(stored.is_unread_for(b.id));
        assert!(!stored.is_unread_for(a.id));

        // the sender cannot mark their own message read
        assert!(!db.mark_read(convo.id, a.id).unwrap());
        assert!(db.mark_read(convo.id, b.id).unwrap());
        assert!(!db.mark_read(convo.id, b.id).unwrap());

        let stored = db.get_conversation(convo.id).unwrap().unwrap();
        let last = stored.last_message.unwrap();
        assert!(last.read);
        assert!(last.read_at.is_some());
        assert_eq!(last.text, "are you free?");

        // a reply resets the flag for the other side
        db.append_message(convo.id, b.id, "Bola", "yes", Utc::now()).unwrap();
        let stored = db.get_conversation(convo.id).unwrap().unwrap();
        assert!(stored.is_unread_for(a.id));
    }

    #[test]
    fn append_to_missing_conversation_fails() {
        let db = Database::open_in_memory().unwrap();
        let a = new_user(&db, "Ada", BloodGroup::ONegative, "Kano", Role::Donor);
        assert!(db.append_message(Uuid::new_v4(), a.id, "Ada", "hi", Utc::now()).is_err());
    }

    #[test]
    fn request_status_never_moves_backward() {
        let db = Database::open_in_memory().unwrap();
        let owner = new_user(&db, "Ada", BloodGroup::ONegative, "Kano", Role::Requester);
        let donor = new_user(&db, "Bola", BloodGroup::ONegative, "Kano", Role::Donor);
        let req = new_request(&db, owner.id, "General Hospital", None);
        assert_eq!(req.status, RequestStatus::Open);

        match db.respond_request(req.id, RequestStatus::Accepted, donor.id).unwrap() {
            RespondOutcome::Updated(r) => {
                assert_eq!(r.status, RequestStatus::Accepted);
                assert_eq!(r.responded_by, Some(donor.id));
            }
            other => panic!("expected update, got {:?}", other),
        }

        match db.respond_request(req.id, RequestStatus::Declined, donor.id).unwrap() {
            RespondOutcome::NotOpen(r) => assert_eq!(r.status, RequestStatus::Accepted),
            other => panic!("expected NotOpen, got {:?}", other),
        }

        assert!(db.respond_request(req.id, RequestStatus::Open, donor.id).is_err());
        assert!(matches!(
            db.respond_request(Uuid::new_v4(), RequestStatus::Declined, donor.id).unwrap(),
            RespondOutcome::NotFound
        ));
    }

    #[test]
    fn request_filters() {
        let db = Database::open_in_memory().unwrap();
        let owner = new_user(&db, "Ada", BloodGroup::ONegative, "Kano", Role::Requester);
        let other = new_user(&db, "Eze", BloodGroup::ONegative, "Kano", Role::Recipient);
        let donor = new_user(&db, "Bola", BloodGroup::ONegative, "Kano", Role::Donor);

        let first = new_request(&db, owner.id, "General Hospital", None);
        let targeted = new_request(&db, other.id, "LUTH", Some(donor.id));
        let newest = new_request(&db, owner.id, "Reddington", None);

        let all = db.list_requests(&RequestFilter::default()).unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), [newest.id, targeted.id, first.id]);

        let mine = db
            .list_requests(&RequestFilter { owner: Some(owner.id), ..Default::default() })
            .unwrap();
        assert_eq!(mine.len(), 2);

        let for_donor = db
            .list_requests(&RequestFilter { donor: Some(donor.id), ..Default::default() })
            .unwrap();
        assert_eq!(for_donor.iter().map(|r| r.id).collect::<Vec<_>>(), [targeted.id]);

        let board = db
            .list_requests(&RequestFilter { untargeted: true, ..Default::default() })
            .unwrap();
        assert_eq!(board.len(), 2);

        db.respond_request(first.id, RequestStatus::Declined, donor.id).unwrap();
        let open = db
            .list_requests(&RequestFilter { status: Some(RequestStatus::Open), ..Default::default() })
            .unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|r| r.id != first.id));
    }

    #[test]
    fn sessions_can_be_revoked() {
        let db = Database::open_in_memory().unwrap();
        let user = new_user(&db, "Ada", BloodGroup::ONegative, "Kano", Role::Donor);
        let sid = Uuid::new_v4();
        db.create_session(sid, user.id).unwrap();
        assert!(db.session_active(sid, user.id).unwrap());
        assert!(!db.session_active(sid, Uuid::new_v4()).unwrap());

        assert!(db.delete_session(sid).unwrap());
        assert!(!db.session_active(sid, user.id).unwrap());
        assert!(!db.delete_session(sid).unwrap());
    }
}
