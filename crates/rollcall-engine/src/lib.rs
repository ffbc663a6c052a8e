//! rollcall-engine — Frame stream processing and the attendance service.
//!
//! Biometric work runs on a dedicated OS thread that owns the injected
//! detector/embedder; requests reach it over an mpsc channel and answers
//! come back over oneshot channels. Frames within one enrollment stream are
//! consumed strictly in arrival order by that thread. [`AttendanceService`]
//! composes the session controller, the ledger, and the engine handle into
//! the interface the surrounding application sees.

pub mod cache;
pub mod config;
pub mod engine;
pub mod service;

pub use cache::TemplateCache;
pub use config::EngineConfig;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use service::{AttendanceService, FaceMarkOutcome};
