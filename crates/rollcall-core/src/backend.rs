//! Black-box detector/embedder contracts.
//!
//! The model behind each trait is out of scope here: backends are injected
//! by the host application, which makes them substitutable in tests.

use crate::types::{Embedding, FaceRegion, Frame};
use thiserror::Error;

/// Backend failure — always fatal for the requesting operation.
///
/// This crate performs no retries; retry policy, if any, belongs to the
/// caller or the backend adapter itself.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("detector backend unavailable: {0}")]
    DetectorUnavailable(String),
    #[error("embedder backend unavailable: {0}")]
    EmbedderUnavailable(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Face detection black box: one frame in, zero or more face regions out.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, BackendError>;
}

/// Face embedding black box: one face crop in, one fixed-length vector out.
pub trait FaceEmbedder: Send {
    fn embed(&mut self, frame: &Frame, region: &FaceRegion) -> Result<Embedding, BackendError>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for &mut T {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, BackendError> {
        (**self).detect(frame)
    }
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, BackendError> {
        (**self).detect(frame)
    }
}

impl<T: FaceEmbedder + ?Sized> FaceEmbedder for &mut T {
    fn embed(&mut self, frame: &Frame, region: &FaceRegion) -> Result<Embedding, BackendError> {
        (**self).embed(frame, region)
    }
}

impl<T: FaceEmbedder + ?Sized> FaceEmbedder for Box<T> {
    fn embed(&mut self, frame: &Frame, region: &FaceRegion) -> Result<Embedding, BackendError> {
        (**self).embed(frame, region)
    }
}
