//! Enrollment pipeline — turns a stream of frames for one identity into a
//! single identity template.
//!
//! Per frame: zero detected faces and multi-face frames are skipped (both
//! are recoverable, the stream continues); exactly one face is cropped,
//! embedded and accumulated. The caller feeds frames in arrival order and
//! finalizes when the target is reached or the stream ends.

use crate::backend::{BackendError, FaceDetector, FaceEmbedder};
use crate::types::{Embedding, Frame, IdentityTemplate};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Sample accumulation bounds for one enrollment stream.
#[derive(Debug, Clone, Copy)]
pub struct EnrollConfig {
    /// Stop accepting once this many samples have been accumulated.
    pub target_samples: usize,
    /// Finalizing below this count fails with `InsufficientSamples`.
    pub min_samples: usize,
}

impl Default for EnrollConfig {
    fn default() -> Self {
        Self {
            target_samples: 30,
            min_samples: 10,
        }
    }
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("insufficient samples: accepted {accepted}, need at least {required}")]
    InsufficientSamples { accepted: usize, required: usize },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Per-frame progress outcome, reported back over the frame channel.
///
/// `NoFaceDetected` and `AmbiguousDetection` are recoverable: the frame is
/// skipped and does not count toward the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Frame accepted; `accepted` is the running sample count.
    Accepted { accepted: usize },
    NoFaceDetected,
    AmbiguousDetection { regions: usize },
}

/// Stateful accumulator for one identity's enrollment stream.
pub struct EnrollmentPipeline<D, E> {
    detector: D,
    embedder: E,
    config: EnrollConfig,
    samples: Vec<Embedding>,
}

impl<D: FaceDetector, E: FaceEmbedder> EnrollmentPipeline<D, E> {
    pub fn new(detector: D, embedder: E, config: EnrollConfig) -> Self {
        Self {
            detector,
            embedder,
            config,
            samples: Vec::with_capacity(config.target_samples),
        }
    }

    /// Process one frame in arrival order.
    ///
    /// Backend failures are fatal for the whole enrollment; everything else
    /// is a [`FrameOutcome`] and the stream continues.
    pub fn ingest(&mut self, frame: &Frame) -> Result<FrameOutcome, BackendError> {
        let regions = self.detector.detect(frame)?;

        match regions.len() {
            0 => Ok(FrameOutcome::NoFaceDetected),
            1 => {
                let embedding = self.embedder.embed(frame, &regions[0])?;
                self.samples.push(embedding);
                Ok(FrameOutcome::Accepted {
                    accepted: self.samples.len(),
                })
            }
            n => Ok(FrameOutcome::AmbiguousDetection { regions: n }),
        }
    }

    /// Number of accepted samples so far.
    pub fn accepted(&self) -> usize {
        self.samples.len()
    }

    /// True once `target_samples` have been accepted; the caller should stop
    /// feeding frames and finalize.
    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.config.target_samples
    }

    /// Finalize the stream into a template.
    ///
    /// The template embedding is the arithmetic mean of the accepted
    /// vectors, re-normalized to unit length after averaging. A stream that
    /// ended (or was cancelled) below `min_samples` fails and all partial
    /// data is discarded — no partial template is ever produced.
    pub fn finalize(
        self,
        identity_id: i64,
        enrolled_at: DateTime<Utc>,
    ) -> Result<IdentityTemplate, EnrollError> {
        let accepted = self.samples.len();
        // A mean needs at least one vector, whatever the configured minimum.
        let required = self.config.min_samples.max(1);
        if accepted < required {
            tracing::warn!(
                identity_id,
                accepted,
                required,
                "enrollment ended below minimum sample count"
            );
            return Err(EnrollError::InsufficientSamples { accepted, required });
        }

        let dim = self.samples[0].dim();
        let mut mean = vec![0.0f32; dim];
        for sample in &self.samples {
            for (acc, v) in mean.iter_mut().zip(sample.values.iter()) {
                *acc += v;
            }
        }
        for v in mean.iter_mut() {
            *v /= accepted as f32;
        }

        // Average first, normalize after: normalizing each sample's
        // contribution separately would bias the mean toward outliers.
        let mut embedding = Embedding { values: mean };
        embedding.normalize();

        tracing::info!(identity_id, samples = accepted, dim, "enrollment finalized");

        Ok(IdentityTemplate {
            identity_id,
            embedding,
            sample_count: accepted,
            enrolled_at,
        })
    }
}
