//! Attendance ledger — converts a validated check-in into at most one
//! durable record per (session, identity).

use crate::controller::SessionController;
use crate::model::{AttendanceRecord, MarkResult, SessionError, SessionMethod};
use crate::store::{AttendanceStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AttendanceLedger {
    sessions: SessionController,
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceLedger {
    pub fn new(sessions: SessionController, store: Arc<dyn AttendanceStore>) -> Self {
        Self { sessions, store }
    }

    /// Record one check-in.
    ///
    /// Preconditions in order: the session must exist and be effectively
    /// active (re-derived, never a trusted flag) or the outcome is
    /// `SessionInvalid`; then a single atomic compare-and-insert decides
    /// between `Marked` and `AlreadyMarked`. The method is audit data only
    /// and never affects dedup.
    pub fn mark(
        &self,
        session_id: Uuid,
        identity_id: i64,
        method: SessionMethod,
    ) -> Result<MarkResult, StoreError> {
        self.mark_at(session_id, identity_id, method, Utc::now())
    }

    pub fn mark_at(
        &self,
        session_id: Uuid,
        identity_id: i64,
        method: SessionMethod,
        now: DateTime<Utc>,
    ) -> Result<MarkResult, StoreError> {
        match self.sessions.ensure_active_at(session_id, now) {
            Ok(_) => {}
            Err(SessionError::NotFound(_)) | Err(SessionError::Inactive) => {
                tracing::debug!(%session_id, identity_id, "mark rejected: session invalid");
                return Ok(MarkResult::SessionInvalid);
            }
            Err(SessionError::Store(e)) => return Err(e),
        }

        let record = AttendanceRecord {
            session_id,
            identity_id,
            marked_at: now,
            method,
        };

        if self.store.insert_if_absent(&record)? {
            tracing::info!(%session_id, identity_id, method = %method, "attendance marked");
            Ok(MarkResult::Marked(record))
        } else {
            tracing::debug!(%session_id, identity_id, "attendance already marked");
            Ok(MarkResult::AlreadyMarked)
        }
    }

    /// Records for one session, oldest first.
    pub fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.store.list_for_session(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::default_qr_ttl;
    use crate::memory::MemoryStore;
    use chrono::Duration;

    fn ledger() -> (SessionController, AttendanceLedger) {
        let store = Arc::new(MemoryStore::new());
        let controller = SessionController::new(store.clone(), default_qr_ttl());
        let ledger = AttendanceLedger::new(controller.clone(), store);
        (controller, ledger)
    }

    #[test]
    fn second_mark_is_a_noop_outcome() {
        let (c, l) = ledger();
        let now = Utc::now();
        let s = c
            .create_session_at(1, SessionMethod::Qr, default_qr_ttl(), now)
            .unwrap();

        let first = l
            .mark_at(s.session_id, 7, SessionMethod::Qr, now)
            .unwrap();
        assert!(matches!(first, MarkResult::Marked(_)));

        let second = l
            .mark_at(s.session_id, 7, SessionMethod::Qr, now)
            .unwrap();
        assert_eq!(second, MarkResult::AlreadyMarked);

        assert_eq!(l.list_for_session(s.session_id).unwrap().len(), 1);
    }

    #[test]
    fn method_does_not_affect_dedup() {
        let (c, l) = ledger();
        let now = Utc::now();
        let s = c
            .create_session_at(1, SessionMethod::Qr, default_qr_ttl(), now)
            .unwrap();

        l.mark_at(s.session_id, 7, SessionMethod::Qr, now).unwrap();
        let via_face = l
            .mark_at(s.session_id, 7, SessionMethod::Face, now)
            .unwrap();
        assert_eq!(via_face, MarkResult::AlreadyMarked);

        // The stored record keeps the first method.
        let records = l.list_for_session(s.session_id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, SessionMethod::Qr);
    }

    #[test]
    fn expired_and_ended_sessions_reject_marks() {
        let (c, l) = ledger();
        let t0 = Utc::now();
        let s = c
            .create_session_at(1, SessionMethod::Qr, default_qr_ttl(), t0)
            .unwrap();

        let t1 = t0 + Duration::minutes(16);
        assert_eq!(
            l.mark_at(s.session_id, 8, SessionMethod::Qr, t1).unwrap(),
            MarkResult::SessionInvalid
        );

        let s2 = c
            .create_session_at(2, SessionMethod::Qr, default_qr_ttl(), t0)
            .unwrap();
        c.end_session_at(s2.session_id, t0).unwrap();
        assert_eq!(
            l.mark_at(s2.session_id, 8, SessionMethod::Qr, t0).unwrap(),
            MarkResult::SessionInvalid
        );
    }

    #[test]
    fn unknown_session_is_invalid_not_error() {
        let (_, l) = ledger();
        assert_eq!(
            l.mark_at(Uuid::new_v4(), 1, SessionMethod::Qr, Utc::now())
                .unwrap(),
            MarkResult::SessionInvalid
        );
    }

    #[test]
    fn distinct_identities_mark_independently() {
        let (c, l) = ledger();
        let now = Utc::now();
        let s = c
            .create_session_at(1, SessionMethod::Qr, default_qr_ttl(), now)
            .unwrap();

        for identity in [3, 4, 5] {
            assert!(matches!(
                l.mark_at(s.session_id, identity, SessionMethod::Qr, now)
                    .unwrap(),
                MarkResult::Marked(_)
            ));
        }
        assert_eq!(l.list_for_session(s.session_id).unwrap().len(), 3);
    }
}
