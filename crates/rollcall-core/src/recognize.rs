//! Recognition engine — decide whether a single frame matches an enrolled
//! identity.
//!
//! Unlike enrollment, a multi-face frame is a hard reject with no match
//! attempted: attributing attendance to the wrong person costs more than
//! asking for another frame.

use crate::backend::{BackendError, FaceDetector, FaceEmbedder};
use crate::types::{Frame, IdentityTemplate};

/// Default minimum cosine similarity for a positive identification.
pub const DEFAULT_THRESHOLD: f32 = 0.65;

/// Outcome of matching one frame against the enrolled templates.
///
/// None of these are errors. `Unknown` and the two detection outcomes are
/// valid results the caller handles without treating the call as failed.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Identified { identity_id: i64, score: f32 },
    Unknown { best_score: f32 },
    NoFaceDetected,
    AmbiguousDetection { regions: usize },
}

pub struct RecognitionEngine<D, E> {
    detector: D,
    embedder: E,
    threshold: f32,
}

impl<D: FaceDetector, E: FaceEmbedder> RecognitionEngine<D, E> {
    pub fn new(detector: D, embedder: E, threshold: f32) -> Self {
        Self {
            detector,
            embedder,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Match one frame against every enrolled template.
    ///
    /// Selection: highest cosine similarity wins; at equal top similarity
    /// the lowest `identity_id` wins, so results are reproducible. The best
    /// score must reach the threshold or the outcome is `Unknown`.
    pub fn match_frame(
        &mut self,
        frame: &Frame,
        templates: &[IdentityTemplate],
    ) -> Result<MatchOutcome, BackendError> {
        let regions = self.detector.detect(frame)?;

        let region = match regions.len() {
            0 => return Ok(MatchOutcome::NoFaceDetected),
            1 => &regions[0],
            n => return Ok(MatchOutcome::AmbiguousDetection { regions: n }),
        };

        let probe = self.embedder.embed(frame, region)?;

        // Always traverse the full gallery, no early exit.
        let mut best_score = f32::NEG_INFINITY;
        let mut best_id: Option<i64> = None;

        for template in templates {
            let score = probe.similarity(&template.embedding);
            let better = score > best_score
                || (score == best_score
                    && best_id.is_some_and(|id| template.identity_id < id));
            if better {
                best_score = score;
                best_id = Some(template.identity_id);
            }
        }

        match best_id {
            Some(identity_id) if best_score >= self.threshold => {
                tracing::debug!(identity_id, score = best_score, "frame identified");
                Ok(MatchOutcome::Identified {
                    identity_id,
                    score: best_score,
                })
            }
            _ => Ok(MatchOutcome::Unknown {
                best_score: if best_score == f32::NEG_INFINITY {
                    0.0
                } else {
                    best_score
                },
            }),
        }
    }
}
