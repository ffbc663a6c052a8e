//! Session controller — owns the attendance-window state machine and its
//! access tokens.
//!
//! Every operation exists in two forms: a wall-clock wrapper and a `*_at`
//! variant taking an explicit `now`, so the lazy-expiry behavior can be
//! driven deterministically in tests.

use crate::model::{Session, SessionError, SessionMethod, SessionStatus};
use crate::store::{SessionStore, StoreError};
use crate::token;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default QR validity window: 15 minutes.
pub fn default_qr_ttl() -> Duration {
    Duration::minutes(15)
}

#[derive(Clone)]
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    qr_ttl: Duration,
}

impl SessionController {
    pub fn new(store: Arc<dyn SessionStore>, qr_ttl: Duration) -> Self {
        Self { store, qr_ttl }
    }

    /// Open a new attendance window with a fresh QR token.
    pub fn create_session(
        &self,
        group_id: i64,
        method: SessionMethod,
    ) -> Result<Session, StoreError> {
        self.create_session_at(group_id, method, self.qr_ttl, Utc::now())
    }

    /// Open a session with an explicit QR validity window.
    pub fn create_session_with_ttl(
        &self,
        group_id: i64,
        method: SessionMethod,
        ttl: Duration,
    ) -> Result<Session, StoreError> {
        self.create_session_at(group_id, method, ttl, Utc::now())
    }

    pub fn create_session_at(
        &self,
        group_id: i64,
        method: SessionMethod,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let session = Session {
            session_id: Uuid::new_v4(),
            group_id,
            method,
            status: SessionStatus::Active,
            created_at: now,
            ended_at: None,
            qr_token: token::generate(),
            qr_expires_at: now + ttl,
            share_token: None,
        };
        self.store.put_session(&session)?;
        tracing::info!(
            session_id = %session.session_id,
            group_id,
            method = %method,
            expires_at = %session.qr_expires_at,
            "session created"
        );
        Ok(session)
    }

    /// Rotate the QR token and expiry in one write, invalidating the
    /// previous token. Permitted from `Active` or `Expired` (a refresh
    /// reopens an expired window); `Ended` is terminal.
    pub fn refresh_qr(&self, session_id: Uuid) -> Result<Session, SessionError> {
        self.refresh_qr_at(session_id, Utc::now())
    }

    pub fn refresh_qr_at(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let session = self.load(session_id)?;
        let mut session = self.resolve_expiry(session, now)?;

        if session.status == SessionStatus::Ended {
            return Err(SessionError::Inactive);
        }

        session.qr_token = token::generate();
        session.qr_expires_at = now + self.qr_ttl;
        session.status = SessionStatus::Active;
        self.store.put_session(&session)?;
        tracing::info!(
            session_id = %session.session_id,
            expires_at = %session.qr_expires_at,
            "qr token rotated"
        );
        Ok(session)
    }

    /// Lazily create the long-lived share token. It is never rotated and
    /// remains readable until the session ends.
    pub fn get_or_create_share_token(&self, session_id: Uuid) -> Result<String, SessionError> {
        self.get_or_create_share_token_at(session_id, Utc::now())
    }

    pub fn get_or_create_share_token_at(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let session = self.load(session_id)?;
        let mut session = self.resolve_expiry(session, now)?;

        if session.status == SessionStatus::Ended {
            return Err(SessionError::Inactive);
        }
        if let Some(existing) = session.share_token {
            return Ok(existing);
        }

        let share = token::generate();
        session.share_token = Some(share.clone());
        self.store.put_session(&session)?;
        tracing::info!(session_id = %session.session_id, "share token created");
        Ok(share)
    }

    /// Check a QR token against a session.
    ///
    /// Valid iff the session is effectively `Active` right now and the
    /// token matches. Observing expiry here persists the `Expired`
    /// transition as a side effect.
    pub fn validate_qr(&self, session_id: Uuid, qr_token: &str) -> Result<bool, StoreError> {
        self.validate_qr_at(session_id, qr_token, Utc::now())
    }

    pub fn validate_qr_at(
        &self,
        session_id: Uuid,
        qr_token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(session) = self.store.get_session(session_id)? else {
            return Ok(false);
        };
        let session = self.resolve_expiry(session, now)?;
        Ok(session.status == SessionStatus::Active && session.qr_token == qr_token)
    }

    /// Resolve a scanned QR token to its session, without judging validity.
    pub fn find_by_qr_token(&self, qr_token: &str) -> Result<Option<Session>, StoreError> {
        self.store.find_by_qr_token(qr_token)
    }

    /// Resolve a share token to its session.
    pub fn find_by_share_token(&self, share_token: &str) -> Result<Option<Session>, StoreError> {
        self.store.find_by_share_token(share_token)
    }

    /// Close the window explicitly. Idempotent: ending an already-ended
    /// session returns it unchanged.
    pub fn end_session(&self, session_id: Uuid) -> Result<Session, SessionError> {
        self.end_session_at(session_id, Utc::now())
    }

    pub fn end_session_at(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let mut session = self.load(session_id)?;
        if session.status == SessionStatus::Ended {
            return Ok(session);
        }
        session.status = SessionStatus::Ended;
        session.ended_at = Some(now);
        self.store.put_session(&session)?;
        tracing::info!(session_id = %session.session_id, "session ended");
        Ok(session)
    }

    /// The group's current attendance window, if one is effectively active.
    pub fn get_active_session(&self, group_id: i64) -> Result<Option<Session>, StoreError> {
        self.get_active_session_at(group_id, Utc::now())
    }

    pub fn get_active_session_at(
        &self,
        group_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let Some(session) = self.store.find_active_by_group(group_id)? else {
            return Ok(None);
        };
        let session = self.resolve_expiry(session, now)?;
        Ok((session.status == SessionStatus::Active).then_some(session))
    }

    /// Load a session and require it to be effectively active.
    ///
    /// This is the mark precondition: the ledger always re-derives validity
    /// through here rather than trusting a stored status flag.
    pub fn ensure_active(&self, session_id: Uuid) -> Result<Session, SessionError> {
        self.ensure_active_at(session_id, Utc::now())
    }

    pub fn ensure_active_at(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        let session = self.load(session_id)?;
        let session = self.resolve_expiry(session, now)?;
        if session.status == SessionStatus::Active {
            Ok(session)
        } else {
            Err(SessionError::Inactive)
        }
    }

    fn load(&self, session_id: Uuid) -> Result<Session, SessionError> {
        self.store
            .get_session(session_id)?
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Persist the `Active → Expired` transition when a read observes that
    /// the window has elapsed.
    fn resolve_expiry(
        &self,
        mut session: Session,
        now: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        if session.status == SessionStatus::Active
            && session.effective_status(now) == SessionStatus::Expired
        {
            session.status = SessionStatus::Expired;
            self.store.put_session(&session)?;
            tracing::debug!(session_id = %session.session_id, "session expired on observation");
        }
        Ok(session)
    }
}
