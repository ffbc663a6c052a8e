//! rollcall-core — Face enrollment and recognition engine.
//!
//! Detection and embedding are black boxes behind the [`FaceDetector`] and
//! [`FaceEmbedder`] traits; this crate owns the policy around them: sample
//! accumulation during enrollment and match selection during recognition.

pub mod backend;
pub mod enroll;
pub mod recognize;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use backend::{BackendError, FaceDetector, FaceEmbedder};
pub use enroll::{EnrollConfig, EnrollError, EnrollmentPipeline, FrameOutcome};
pub use recognize::{MatchOutcome, RecognitionEngine};
pub use types::{Embedding, FaceRegion, Frame, IdentityTemplate};
