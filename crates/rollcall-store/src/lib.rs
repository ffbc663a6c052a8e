//! rollcall-store — SQLite persistence for sessions, templates, and
//! attendance records.
//!
//! Attendance dedup rides on the `(session_id, identity_id)` primary key:
//! `insert_if_absent` is a single `INSERT OR IGNORE`, so concurrent
//! duplicate check-ins can never produce two rows. Embeddings are stored as
//! little-endian f32 blobs.

use chrono::{DateTime, Utc};
use rollcall_core::{Embedding, IdentityTemplate};
use rollcall_session::{
    AttendanceRecord, AttendanceStore, Session, SessionStore, StoreError, TemplateStore,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id    TEXT PRIMARY KEY,
    group_id      INTEGER NOT NULL,
    method        TEXT NOT NULL,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    ended_at      TEXT,
    qr_token      TEXT NOT NULL,
    qr_expires_at TEXT NOT NULL,
    share_token   TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_group_status ON sessions (group_id, status);
CREATE INDEX IF NOT EXISTS idx_sessions_qr_token ON sessions (qr_token);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_share_token ON sessions (share_token);

CREATE TABLE IF NOT EXISTS templates (
    identity_id  INTEGER PRIMARY KEY,
    embedding    BLOB NOT NULL,
    sample_count INTEGER NOT NULL,
    enrolled_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    session_id   TEXT NOT NULL,
    identity_id  INTEGER NOT NULL,
    marked_at    TEXT NOT NULL,
    method       TEXT NOT NULL,
    PRIMARY KEY (session_id, identity_id)
) WITHOUT ROWID;
";

const SESSION_COLUMNS: &str = "session_id, group_id, method, status, created_at, \
     ended_at, qr_token, qr_expires_at, share_token";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        tracing::info!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_session(&self, where_clause: &str, param: &dyn rusqlite::ToSql)
        -> Result<Option<Session>, StoreError> {
        let conn = self.lock();
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {where_clause}");
        let raw = conn
            .query_row(&sql, params![param], raw_session)
            .optional()
            .map_err(db_err)?;
        raw.map(RawSession::into_session).transpose()
    }
}

impl SessionStore for SqliteStore {
    fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO sessions \
             (session_id, group_id, method, status, created_at, ended_at, \
              qr_token, qr_expires_at, share_token) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.session_id.to_string(),
                session.group_id,
                session.method.as_str(),
                session.status.as_str(),
                session.created_at.to_rfc3339(),
                session.ended_at.map(|t| t.to_rfc3339()),
                session.qr_token,
                session.qr_expires_at.to_rfc3339(),
                session.share_token,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        self.query_session("session_id = ?1", &session_id.to_string())
    }

    fn find_active_by_group(&self, group_id: i64) -> Result<Option<Session>, StoreError> {
        self.query_session(
            "group_id = ?1 AND status = 'active' ORDER BY created_at DESC LIMIT 1",
            &group_id,
        )
    }

    fn find_by_qr_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        self.query_session("qr_token = ?1", &token)
    }

    fn find_by_share_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        self.query_session("share_token = ?1", &token)
    }
}

impl TemplateStore for SqliteStore {
    fn put_template(&self, template: &IdentityTemplate) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO templates \
             (identity_id, embedding, sample_count, enrolled_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                template.identity_id,
                encode_embedding(&template.embedding),
                template.sample_count as i64,
                template.enrolled_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_template(&self, identity_id: i64) -> Result<Option<IdentityTemplate>, StoreError> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT identity_id, embedding, sample_count, enrolled_at \
                 FROM templates WHERE identity_id = ?1",
                [identity_id],
                raw_template,
            )
            .optional()
            .map_err(db_err)?;
        raw.map(RawTemplate::into_template).transpose()
    }

    fn load_templates(&self) -> Result<Vec<IdentityTemplate>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT identity_id, embedding, sample_count, enrolled_at \
                 FROM templates ORDER BY identity_id",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], raw_template).map_err(db_err)?;

        let mut templates = Vec::new();
        for raw in rows {
            templates.push(raw.map_err(db_err)?.into_template()?);
        }
        Ok(templates)
    }

    fn delete_template(&self, identity_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock();
        let deleted = conn
            .execute("DELETE FROM templates WHERE identity_id = ?1", [identity_id])
            .map_err(db_err)?;
        Ok(deleted > 0)
    }
}

impl AttendanceStore for SqliteStore {
    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let conn = self.lock();
        // One statement: the primary key does the compare, IGNORE makes the
        // duplicate a no-op instead of an error.
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO attendance \
                 (session_id, identity_id, marked_at, method) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.session_id.to_string(),
                    record.identity_id,
                    record.marked_at.to_rfc3339(),
                    record.method.as_str(),
                ],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT session_id, identity_id, marked_at, method \
                 FROM attendance WHERE session_id = ?1 \
                 ORDER BY marked_at, identity_id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([session_id.to_string()], raw_record)
            .map_err(db_err)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw.map_err(db_err)?.into_record()?);
        }
        Ok(records)
    }
}

// --- row decoding ---

struct RawSession {
    session_id: String,
    group_id: i64,
    method: String,
    status: String,
    created_at: String,
    ended_at: Option<String>,
    qr_token: String,
    qr_expires_at: String,
    share_token: Option<String>,
}

fn raw_session(row: &Row<'_>) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        session_id: row.get(0)?,
        group_id: row.get(1)?,
        method: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        ended_at: row.get(5)?,
        qr_token: row.get(6)?,
        qr_expires_at: row.get(7)?,
        share_token: row.get(8)?,
    })
}

impl RawSession {
    fn into_session(self) -> Result<Session, StoreError> {
        Ok(Session {
            session_id: parse_uuid(&self.session_id)?,
            group_id: self.group_id,
            method: self.method.parse()?,
            status: self.status.parse()?,
            created_at: parse_ts(&self.created_at)?,
            ended_at: self.ended_at.as_deref().map(parse_ts).transpose()?,
            qr_token: self.qr_token,
            qr_expires_at: parse_ts(&self.qr_expires_at)?,
            share_token: self.share_token,
        })
    }
}

struct RawTemplate {
    identity_id: i64,
    embedding: Vec<u8>,
    sample_count: i64,
    enrolled_at: String,
}

fn raw_template(row: &Row<'_>) -> rusqlite::Result<RawTemplate> {
    Ok(RawTemplate {
        identity_id: row.get(0)?,
        embedding: row.get(1)?,
        sample_count: row.get(2)?,
        enrolled_at: row.get(3)?,
    })
}

impl RawTemplate {
    fn into_template(self) -> Result<IdentityTemplate, StoreError> {
        Ok(IdentityTemplate {
            identity_id: self.identity_id,
            embedding: decode_embedding(&self.embedding)?,
            sample_count: self.sample_count as usize,
            enrolled_at: parse_ts(&self.enrolled_at)?,
        })
    }
}

struct RawRecord {
    session_id: String,
    identity_id: i64,
    marked_at: String,
    method: String,
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        session_id: row.get(0)?,
        identity_id: row.get(1)?,
        marked_at: row.get(2)?,
        method: row.get(3)?,
    })
}

impl RawRecord {
    fn into_record(self) -> Result<AttendanceRecord, StoreError> {
        Ok(AttendanceRecord {
            session_id: parse_uuid(&self.session_id)?,
            identity_id: self.identity_id,
            marked_at: parse_ts(&self.marked_at)?,
            method: self.method.parse()?,
        })
    }
}

/// Serialize an embedding as little-endian f32 bytes.
fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.values.len() * 4);
    for v in &embedding.values {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn decode_embedding(blob: &[u8]) -> Result<Embedding, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    let values = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Embedding { values })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{s}': {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("uuid '{s}': {e}")))
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rollcall_session::{SessionMethod, SessionStatus};

    fn session(group_id: i64, now: DateTime<Utc>) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            group_id,
            method: SessionMethod::Qr,
            status: SessionStatus::Active,
            created_at: now,
            ended_at: None,
            qr_token: "qr-token-value".into(),
            qr_expires_at: now + Duration::minutes(15),
            share_token: Some("share-token-value".into()),
        }
    }

    fn template(identity_id: i64, values: Vec<f32>) -> IdentityTemplate {
        IdentityTemplate {
            identity_id,
            embedding: Embedding { values },
            sample_count: 28,
            enrolled_at: Utc::now(),
        }
    }

    #[test]
    fn session_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = session(1, Utc::now());
        store.put_session(&s).unwrap();

        let loaded = store.get_session(s.session_id).unwrap().unwrap();
        assert_eq!(loaded.session_id, s.session_id);
        assert_eq!(loaded.group_id, 1);
        assert_eq!(loaded.method, SessionMethod::Qr);
        assert_eq!(loaded.status, SessionStatus::Active);
        assert_eq!(loaded.qr_token, s.qr_token);
        assert_eq!(loaded.qr_expires_at, s.qr_expires_at);
        assert_eq!(loaded.share_token, s.share_token);
        assert_eq!(loaded.ended_at, None);
    }

    #[test]
    fn session_replace_updates_in_place() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut s = session(1, Utc::now());
        store.put_session(&s).unwrap();

        s.status = SessionStatus::Ended;
        s.ended_at = Some(Utc::now());
        store.put_session(&s).unwrap();

        let loaded = store.get_session(s.session_id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Ended);
        assert!(loaded.ended_at.is_some());
    }

    #[test]
    fn token_lookups() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = session(1, Utc::now());
        store.put_session(&s).unwrap();

        assert_eq!(
            store
                .find_by_qr_token("qr-token-value")
                .unwrap()
                .unwrap()
                .session_id,
            s.session_id
        );
        assert_eq!(
            store
                .find_by_share_token("share-token-value")
                .unwrap()
                .unwrap()
                .session_id,
            s.session_id
        );
        assert!(store.find_by_qr_token("missing").unwrap().is_none());
    }

    #[test]
    fn active_by_group_prefers_newest_active() {
        let store = SqliteStore::open_in_memory().unwrap();
        let t0 = Utc::now();

        let mut ended = session(4, t0 - Duration::minutes(30));
        ended.status = SessionStatus::Ended;
        ended.share_token = None;
        store.put_session(&ended).unwrap();

        let mut older = session(4, t0 - Duration::minutes(10));
        older.share_token = None;
        store.put_session(&older).unwrap();

        let mut newest = session(4, t0);
        newest.share_token = None;
        store.put_session(&newest).unwrap();

        let found = store.find_active_by_group(4).unwrap().unwrap();
        assert_eq!(found.session_id, newest.session_id);
        assert!(store.find_active_by_group(99).unwrap().is_none());
    }

    #[test]
    fn template_round_trip_and_replace() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_template(&template(42, vec![0.1, 0.2, 0.3])).unwrap();

        let loaded = store.get_template(42).unwrap().unwrap();
        assert_eq!(loaded.embedding.values, vec![0.1, 0.2, 0.3]);
        assert_eq!(loaded.sample_count, 28);

        // Last write wins, one template per identity.
        store.put_template(&template(42, vec![0.9, 0.8, 0.7])).unwrap();
        let replaced = store.get_template(42).unwrap().unwrap();
        assert_eq!(replaced.embedding.values, vec![0.9, 0.8, 0.7]);
        assert_eq!(store.load_templates().unwrap().len(), 1);
    }

    #[test]
    fn load_templates_ordered_by_identity() {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in [9, 2, 5] {
            store.put_template(&template(id, vec![1.0])).unwrap();
        }
        let ids: Vec<i64> = store
            .load_templates()
            .unwrap()
            .iter()
            .map(|t| t.identity_id)
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn delete_template_reports_presence() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_template(&template(1, vec![1.0])).unwrap();
        assert!(store.delete_template(1).unwrap());
        assert!(!store.delete_template(1).unwrap());
    }

    #[test]
    fn attendance_dedup_is_atomic_insert() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = AttendanceRecord {
            session_id: Uuid::new_v4(),
            identity_id: 7,
            marked_at: Utc::now(),
            method: SessionMethod::Qr,
        };

        assert!(store.insert_if_absent(&record).unwrap());

        // Same (session, identity), different method and time: still a dup.
        let retry = AttendanceRecord {
            marked_at: record.marked_at + Duration::seconds(30),
            method: SessionMethod::Face,
            ..record.clone()
        };
        assert!(!store.insert_if_absent(&retry).unwrap());

        let records = store.list_for_session(record.session_id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, SessionMethod::Qr);
    }

    #[test]
    fn embedding_blob_round_trip() {
        let e = Embedding {
            values: vec![0.0, -1.5, 3.25, f32::MIN_POSITIVE],
        };
        let decoded = decode_embedding(&encode_embedding(&e)).unwrap();
        assert_eq!(decoded.values, e.values);

        assert!(matches!(
            decode_embedding(&[1, 2, 3]),
            Err(StoreError::Corrupt(_))
        ));
    }
}
