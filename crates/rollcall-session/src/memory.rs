//! In-memory store — mutex-guarded maps implementing the storage traits.
//!
//! Used by the test suites and by embedders that do not want SQLite. The
//! single mutex makes `insert_if_absent` trivially atomic.

use crate::model::{AttendanceRecord, Session};
use crate::store::{AttendanceStore, SessionStore, StoreError, TemplateStore};
use rollcall_core::IdentityTemplate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Session>,
    templates: HashMap<i64, IdentityTemplate>,
    attendance: HashMap<(Uuid, i64), AttendanceRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        self.lock()
            .sessions
            .insert(session.session_id, session.clone());
        Ok(())
    }

    fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.lock().sessions.get(&session_id).cloned())
    }

    fn find_active_by_group(&self, group_id: i64) -> Result<Option<Session>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| {
                s.group_id == group_id && s.status == crate::model::SessionStatus::Active
            })
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    fn find_by_qr_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| s.qr_token == token)
            .cloned())
    }

    fn find_by_share_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| s.share_token.as_deref() == Some(token))
            .cloned())
    }
}

impl TemplateStore for MemoryStore {
    fn put_template(&self, template: &IdentityTemplate) -> Result<(), StoreError> {
        self.lock()
            .templates
            .insert(template.identity_id, template.clone());
        Ok(())
    }

    fn get_template(&self, identity_id: i64) -> Result<Option<IdentityTemplate>, StoreError> {
        Ok(self.lock().templates.get(&identity_id).cloned())
    }

    fn load_templates(&self) -> Result<Vec<IdentityTemplate>, StoreError> {
        let mut templates: Vec<_> = self.lock().templates.values().cloned().collect();
        templates.sort_by_key(|t| t.identity_id);
        Ok(templates)
    }

    fn delete_template(&self, identity_id: i64) -> Result<bool, StoreError> {
        Ok(self.lock().templates.remove(&identity_id).is_some())
    }
}

impl AttendanceStore for MemoryStore {
    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let key = (record.session_id, record.identity_id);
        if inner.attendance.contains_key(&key) {
            return Ok(false);
        }
        inner.attendance.insert(key, record.clone());
        Ok(true)
    }

    fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut records: Vec<_> = self
            .lock()
            .attendance
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.marked_at, r.identity_id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SessionMethod, SessionStatus};
    use chrono::{Duration, Utc};

    fn session(group_id: i64) -> Session {
        let now = Utc::now();
        Session {
            session_id: Uuid::new_v4(),
            group_id,
            method: SessionMethod::Qr,
            status: SessionStatus::Active,
            created_at: now,
            ended_at: None,
            qr_token: crate::token::generate(),
            qr_expires_at: now + Duration::minutes(15),
            share_token: None,
        }
    }

    #[test]
    fn session_round_trip_and_token_lookup() {
        let store = MemoryStore::new();
        let s = session(1);
        store.put_session(&s).unwrap();

        let by_id = store.get_session(s.session_id).unwrap().unwrap();
        assert_eq!(by_id.qr_token, s.qr_token);

        let by_token = store.find_by_qr_token(&s.qr_token).unwrap().unwrap();
        assert_eq!(by_token.session_id, s.session_id);

        assert!(store.find_by_qr_token("nope").unwrap().is_none());
    }

    #[test]
    fn active_lookup_prefers_latest() {
        let store = MemoryStore::new();
        let mut older = session(9);
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = session(9);
        store.put_session(&older).unwrap();
        store.put_session(&newer).unwrap();

        let found = store.find_active_by_group(9).unwrap().unwrap();
        assert_eq!(found.session_id, newer.session_id);
    }

    #[test]
    fn attendance_insert_is_once_only() {
        let store = MemoryStore::new();
        let record = AttendanceRecord {
            session_id: Uuid::new_v4(),
            identity_id: 7,
            marked_at: Utc::now(),
            method: SessionMethod::Qr,
        };
        assert!(store.insert_if_absent(&record).unwrap());
        assert!(!store.insert_if_absent(&record).unwrap());
        assert_eq!(store.list_for_session(record.session_id).unwrap().len(), 1);
    }
}
