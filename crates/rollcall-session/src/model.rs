use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// How members check in to a session. Recorded on each attendance record
/// for audit; it never affects dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMethod {
    Qr,
    Face,
}

impl SessionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMethod::Qr => "qr",
            SessionMethod::Face => "face",
        }
    }
}

impl fmt::Display for SessionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMethod {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qr" => Ok(SessionMethod::Qr),
            "face" => Ok(SessionMethod::Face),
            other => Err(StoreError::Corrupt(format!("unknown method '{other}'"))),
        }
    }
}

/// Session state machine.
///
/// `Active → Expired` happens by elapsed time, observed lazily on read;
/// `Active → Ended` (and `Expired → Ended`) by explicit action. Nothing
/// leaves `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(StoreError::Corrupt(format!("unknown status '{other}'"))),
        }
    }
}

/// One attendance window for a group.
///
/// At most one QR token is valid at any instant; `refresh_qr` replaces the
/// token and expiry together. The share token, once created, survives QR
/// refreshes and is never rotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub group_id: i64,
    pub method: SessionMethod,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub qr_token: String,
    pub qr_expires_at: DateTime<Utc>,
    pub share_token: Option<String>,
}

impl Session {
    /// Status re-derived against `now`. A stale `Active` flag is never
    /// trusted: the window is closed once `now >= qr_expires_at`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        match self.status {
            SessionStatus::Active if now >= self.qr_expires_at => SessionStatus::Expired,
            status => status,
        }
    }
}

/// One durable check-in. Unique per (session, identity); immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub session_id: Uuid,
    pub identity_id: i64,
    pub marked_at: DateTime<Utc>,
    pub method: SessionMethod,
}

/// Outcome of a mark attempt. `AlreadyMarked` and `SessionInvalid` are soft
/// outcomes, distinguishable from failure in the return type.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkResult {
    Marked(AttendanceRecord),
    AlreadyMarked,
    SessionInvalid,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(Uuid),
    #[error("session is not active")]
    Inactive,
    #[error(transparent)]
    Store(#[from] StoreError),
}
