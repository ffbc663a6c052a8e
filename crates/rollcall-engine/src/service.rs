//! Attendance service — the facade the surrounding application talks to.

use crate::config::EngineConfig;
use crate::engine::{spawn_engine, EngineError, EngineHandle};
use chrono::{DateTime, Duration, Utc};
use rollcall_core::{
    FaceDetector, FaceEmbedder, Frame, FrameOutcome, IdentityTemplate, MatchOutcome,
};
use rollcall_session::{
    AttendanceLedger, AttendanceRecord, AttendanceStore, MarkResult, Session, SessionController,
    SessionError, SessionMethod, SessionStore, StoreError, TemplateStore,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outcome of a face check-in attempt.
///
/// The non-match outcomes short-circuit before the ledger: a frame that is
/// not confidently one enrolled person never produces a write.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceMarkOutcome {
    Marked(AttendanceRecord),
    AlreadyMarked,
    SessionInvalid,
    Unknown { best_score: f32 },
    NoFaceDetected,
    AmbiguousDetection { regions: usize },
}

pub struct AttendanceService {
    sessions: SessionController,
    ledger: AttendanceLedger,
    engine: EngineHandle,
}

impl AttendanceService {
    /// Wire the service over one shared store and the injected backends.
    pub fn new<S>(
        store: Arc<S>,
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn FaceEmbedder>,
        config: EngineConfig,
    ) -> Self
    where
        S: SessionStore + TemplateStore + AttendanceStore + 'static,
    {
        let session_store: Arc<dyn SessionStore> = store.clone();
        let template_store: Arc<dyn TemplateStore> = store.clone();
        let attendance_store: Arc<dyn AttendanceStore> = store;

        let sessions = SessionController::new(session_store, config.qr_ttl());
        let ledger = AttendanceLedger::new(sessions.clone(), attendance_store);
        let engine = spawn_engine(detector, embedder, template_store, config);

        Self {
            sessions,
            ledger,
            engine,
        }
    }

    pub fn sessions(&self) -> &SessionController {
        &self.sessions
    }

    pub fn create_session(
        &self,
        group_id: i64,
        method: SessionMethod,
    ) -> Result<Session, StoreError> {
        self.sessions.create_session(group_id, method)
    }

    pub fn create_session_with_ttl(
        &self,
        group_id: i64,
        method: SessionMethod,
        ttl: Duration,
    ) -> Result<Session, StoreError> {
        self.sessions.create_session_with_ttl(group_id, method, ttl)
    }

    pub fn refresh_qr(&self, session_id: Uuid) -> Result<Session, SessionError> {
        self.sessions.refresh_qr(session_id)
    }

    pub fn get_active_session(&self, group_id: i64) -> Result<Option<Session>, StoreError> {
        self.sessions.get_active_session(group_id)
    }

    pub fn end_session(&self, session_id: Uuid) -> Result<Session, SessionError> {
        self.sessions.end_session(session_id)
    }

    pub fn get_or_create_share_token(&self, session_id: Uuid) -> Result<String, SessionError> {
        self.sessions.get_or_create_share_token(session_id)
    }

    /// Records for one session, oldest first.
    pub fn attendance(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.ledger.list_for_session(session_id)
    }

    /// Enroll one identity from a frame stream. Per-frame outcomes are
    /// reported on `progress` when given.
    pub async fn enroll(
        &self,
        identity_id: i64,
        frames: mpsc::Receiver<Frame>,
        progress: Option<mpsc::Sender<FrameOutcome>>,
    ) -> Result<IdentityTemplate, EngineError> {
        self.engine.enroll(identity_id, frames, progress).await
    }

    /// Check in by scanned QR token.
    pub fn mark_via_qr(&self, qr_token: &str, identity_id: i64) -> Result<MarkResult, StoreError> {
        self.mark_via_qr_at(qr_token, identity_id, Utc::now())
    }

    pub fn mark_via_qr_at(
        &self,
        qr_token: &str,
        identity_id: i64,
        now: DateTime<Utc>,
    ) -> Result<MarkResult, StoreError> {
        let Some(session) = self.sessions.find_by_qr_token(qr_token)? else {
            return Ok(MarkResult::SessionInvalid);
        };
        if !self
            .sessions
            .validate_qr_at(session.session_id, qr_token, now)?
        {
            return Ok(MarkResult::SessionInvalid);
        }
        self.ledger
            .mark_at(session.session_id, identity_id, SessionMethod::Qr, now)
    }

    /// Check in by shareable link token. The share token never rotates,
    /// but the session window must still be open.
    pub fn mark_via_share(
        &self,
        share_token: &str,
        identity_id: i64,
    ) -> Result<MarkResult, StoreError> {
        self.mark_via_share_at(share_token, identity_id, Utc::now())
    }

    pub fn mark_via_share_at(
        &self,
        share_token: &str,
        identity_id: i64,
        now: DateTime<Utc>,
    ) -> Result<MarkResult, StoreError> {
        let Some(session) = self.sessions.find_by_share_token(share_token)? else {
            return Ok(MarkResult::SessionInvalid);
        };
        self.ledger
            .mark_at(session.session_id, identity_id, SessionMethod::Qr, now)
    }

    /// Check in by live face match.
    ///
    /// The session window is checked before any inference runs; a match
    /// below `Identified` short-circuits without touching the ledger.
    pub async fn mark_via_face(
        &self,
        session_id: Uuid,
        frame: Frame,
    ) -> Result<FaceMarkOutcome, EngineError> {
        match self.sessions.ensure_active(session_id) {
            Ok(_) => {}
            Err(SessionError::NotFound(_)) | Err(SessionError::Inactive) => {
                return Ok(FaceMarkOutcome::SessionInvalid);
            }
            Err(SessionError::Store(e)) => return Err(e.into()),
        }

        let identity_id = match self.engine.match_frame(frame).await? {
            MatchOutcome::Identified { identity_id, score } => {
                tracing::debug!(%session_id, identity_id, score, "face identified for check-in");
                identity_id
            }
            MatchOutcome::Unknown { best_score } => {
                return Ok(FaceMarkOutcome::Unknown { best_score })
            }
            MatchOutcome::NoFaceDetected => return Ok(FaceMarkOutcome::NoFaceDetected),
            MatchOutcome::AmbiguousDetection { regions } => {
                return Ok(FaceMarkOutcome::AmbiguousDetection { regions })
            }
        };

        // Re-checked inside mark: an end_session racing the match decision
        // still wins (last consistent read).
        let result = self
            .ledger
            .mark(session_id, identity_id, SessionMethod::Face)?;
        Ok(match result {
            MarkResult::Marked(record) => FaceMarkOutcome::Marked(record),
            MarkResult::AlreadyMarked => FaceMarkOutcome::AlreadyMarked,
            MarkResult::SessionInvalid => FaceMarkOutcome::SessionInvalid,
        })
    }
}
