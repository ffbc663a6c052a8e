//! rollcall-session — Attendance session lifecycle and the dedup ledger.
//!
//! A session is a time-bounded attendance window with a rotating QR token
//! and an optional long-lived share token. [`SessionController`] owns the
//! `ACTIVE → EXPIRED / ENDED` state machine (expiry is lazy, observed on
//! read — there is no background sweep); [`AttendanceLedger`] guarantees at
//! most one attendance record per (session, identity).

pub mod controller;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod store;
pub mod token;

pub use controller::SessionController;
pub use ledger::AttendanceLedger;
pub use memory::MemoryStore;
pub use model::{
    AttendanceRecord, MarkResult, Session, SessionError, SessionMethod, SessionStatus,
};
pub use store::{AttendanceStore, SessionStore, StoreError, TemplateStore};
