//! Persistence collaborator contracts.
//!
//! The relational layer is external to this core: these traits are the
//! whole surface it relies on. Implementations must make
//! [`AttendanceStore::insert_if_absent`] atomic (a single compare-and-insert,
//! never a read followed by a separate write) and must not interleave
//! partial template writes for the same identity.

use crate::model::{AttendanceRecord, Session};
use rollcall_core::IdentityTemplate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub trait SessionStore: Send + Sync {
    /// Insert or fully replace a session row.
    fn put_session(&self, session: &Session) -> Result<(), StoreError>;

    fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Most recently created session for the group whose stored status is
    /// still `active`. Lazy expiry is the caller's job.
    fn find_active_by_group(&self, group_id: i64) -> Result<Option<Session>, StoreError>;

    fn find_by_qr_token(&self, token: &str) -> Result<Option<Session>, StoreError>;

    fn find_by_share_token(&self, token: &str) -> Result<Option<Session>, StoreError>;
}

pub trait TemplateStore: Send + Sync {
    /// Insert or fully replace the template for its identity (last write
    /// wins; never a partial update).
    fn put_template(&self, template: &IdentityTemplate) -> Result<(), StoreError>;

    fn get_template(&self, identity_id: i64) -> Result<Option<IdentityTemplate>, StoreError>;

    /// All enrolled templates, for gallery matching.
    fn load_templates(&self) -> Result<Vec<IdentityTemplate>, StoreError>;

    /// Returns true if a template existed and was removed.
    fn delete_template(&self, identity_id: i64) -> Result<bool, StoreError>;
}

pub trait AttendanceStore: Send + Sync {
    /// Atomic compare-and-insert on (session_id, identity_id).
    ///
    /// Returns true if the record was inserted, false if one already
    /// existed. Concurrent duplicate check-ins must yield exactly one row.
    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, StoreError>;

    fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>, StoreError>;
}
