//! Scripted detector/embedder backends for unit tests.
//!
//! Frames carry their own script: byte 0 is the number of faces the detector
//! reports, byte 1 selects the embedding the embedder returns.

use crate::backend::{BackendError, FaceDetector, FaceEmbedder};
use crate::types::{Embedding, FaceRegion, Frame};

/// Build a frame that detects as `faces` regions and embeds as `axis`.
///
/// Axes 0..=2 map to one-hot unit vectors in a 3-dimensional space; axis 3
/// maps to the normalized blend of axes 0 and 1 (cosine ~0.7071 to both).
pub(crate) fn axis_frame(faces: u8, axis: u8) -> Frame {
    Frame {
        data: vec![faces, axis],
        width: 2,
        height: 1,
    }
}

pub(crate) struct ScriptedDetector;

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, BackendError> {
        let n = frame.data.first().copied().unwrap_or(0) as usize;
        Ok((0..n)
            .map(|i| FaceRegion {
                x: i as f32 * 10.0,
                y: 0.0,
                width: 8.0,
                height: 8.0,
                confidence: 0.9,
            })
            .collect())
    }
}

pub(crate) struct ScriptedEmbedder;

impl FaceEmbedder for ScriptedEmbedder {
    fn embed(&mut self, frame: &Frame, _region: &FaceRegion) -> Result<Embedding, BackendError> {
        let axis = frame.data.get(1).copied().unwrap_or(0);
        let values = match axis {
            0 => vec![1.0, 0.0, 0.0],
            1 => vec![0.0, 1.0, 0.0],
            2 => vec![0.0, 0.0, 1.0],
            // Blend of axes 0 and 1, pre-normalized.
            _ => vec![
                std::f32::consts::FRAC_1_SQRT_2,
                std::f32::consts::FRAC_1_SQRT_2,
                0.0,
            ],
        };
        Ok(Embedding { values })
    }
}

/// Detector that always fails, for backend-fatal paths.
pub(crate) struct FailingDetector;

impl FaceDetector for FailingDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, BackendError> {
        Err(BackendError::DetectorUnavailable("scripted outage".into()))
    }
}
