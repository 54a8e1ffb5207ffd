use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password        TEXT NOT NULL,
            blood_group     TEXT NOT NULL,
            location        TEXT NOT NULL,
            state           TEXT,
            lga             TEXT,
            role            TEXT NOT NULL,
            is_available    INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_donor_search
            ON users(role, blood_group, location);

        CREATE TABLE IF NOT EXISTS sessions (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS requests (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            donor_id        TEXT REFERENCES users(id),
            blood_group     TEXT NOT NULL,
            hospital        TEXT NOT NULL,
            location        TEXT NOT NULL,
            patient_name    TEXT,
            notes           TEXT,
            urgency         TEXT NOT NULL,
            units_required  INTEGER NOT NULL,
            status          TEXT NOT NULL DEFAULT 'open',
            responded_by    TEXT REFERENCES users(id),
            responded_at    TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_requests_created
            ON requests(created_at);

        -- pair_key is the sorted participant pair: one conversation per pair
        CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            pair_key            TEXT NOT NULL UNIQUE,
            participant_a       TEXT NOT NULL REFERENCES users(id),
            participant_b       TEXT NOT NULL REFERENCES users(id),
            name_a              TEXT NOT NULL,
            name_b              TEXT NOT NULL,
            last_text           TEXT,
            last_sender         TEXT,
            last_sender_name    TEXT,
            last_timestamp      TEXT,
            last_read           INTEGER,
            last_read_at        TEXT,
            last_updated        TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_a
            ON conversations(participant_a, last_updated);
        CREATE INDEX IF NOT EXISTS idx_conversations_b
            ON conversations(participant_b, last_updated);

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            conversation_id     TEXT NOT NULL REFERENCES conversations(id),
            text                TEXT NOT NULL,
            sender              TEXT NOT NULL REFERENCES users(id),
            sender_name         TEXT NOT NULL,
            timestamp           TEXT NOT NULL,
            read                INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, timestamp);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
