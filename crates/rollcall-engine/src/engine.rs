//! Engine thread — owns the detector/embedder and processes biometric
//! requests one at a time on a dedicated OS thread.
//!
//! Each enrollment stream arrives as its own frame channel and is consumed
//! in arrival order; the only suspension point is waiting for the next
//! frame. Distinct requests never interleave, which also serializes all
//! template writes.

use crate::cache::TemplateCache;
use crate::config::EngineConfig;
use chrono::Utc;
use rollcall_core::{
    BackendError, EnrollError, EnrollmentPipeline, FaceDetector, FaceEmbedder, Frame,
    FrameOutcome, IdentityTemplate, MatchOutcome, RecognitionEngine,
};
use rollcall_session::{StoreError, TemplateStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("insufficient samples: accepted {accepted}, need at least {required}")]
    InsufficientSamples { accepted: usize, required: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<EnrollError> for EngineError {
    fn from(e: EnrollError) -> Self {
        match e {
            EnrollError::InsufficientSamples { accepted, required } => {
                EngineError::InsufficientSamples { accepted, required }
            }
            EnrollError::Backend(e) => EngineError::Backend(e),
        }
    }
}

/// Messages sent from the service to the engine thread.
enum EngineRequest {
    Enroll {
        identity_id: i64,
        frames: mpsc::Receiver<Frame>,
        progress: Option<mpsc::Sender<FrameOutcome>>,
        reply: oneshot::Sender<Result<IdentityTemplate, EngineError>>,
    },
    MatchFrame {
        frame: Frame,
        reply: oneshot::Sender<Result<MatchOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll one identity from a frame stream.
    ///
    /// Per-frame outcomes are reported on `progress` (when given). On
    /// success the new template has atomically replaced any prior one.
    pub async fn enroll(
        &self,
        identity_id: i64,
        frames: mpsc::Receiver<Frame>,
        progress: Option<mpsc::Sender<FrameOutcome>>,
    ) -> Result<IdentityTemplate, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                identity_id,
                frames,
                progress,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Match a single frame against the enrolled gallery.
    pub async fn match_frame(&self, frame: Frame) -> Result<MatchOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::MatchFrame {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread takes sole ownership of the injected detector/embedder and
/// the template cache, then enters a request loop until every handle is
/// dropped.
pub fn spawn_engine(
    mut detector: Box<dyn FaceDetector>,
    mut embedder: Box<dyn FaceEmbedder>,
    templates: Arc<dyn TemplateStore>,
    config: EngineConfig,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut cache = TemplateCache::new(templates.clone());

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        identity_id,
                        mut frames,
                        progress,
                        reply,
                    } => {
                        let result = run_enroll(
                            &mut detector,
                            &mut embedder,
                            templates.as_ref(),
                            &mut cache,
                            &config,
                            identity_id,
                            &mut frames,
                            progress,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::MatchFrame { frame, reply } => {
                        let result =
                            run_match(&mut detector, &mut embedder, &mut cache, &config, &frame);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

/// Consume the frame stream in arrival order until the sample target is
/// reached or the stream ends, then finalize and persist the template.
#[allow(clippy::too_many_arguments)]
fn run_enroll(
    detector: &mut Box<dyn FaceDetector>,
    embedder: &mut Box<dyn FaceEmbedder>,
    store: &dyn TemplateStore,
    cache: &mut TemplateCache,
    config: &EngineConfig,
    identity_id: i64,
    frames: &mut mpsc::Receiver<Frame>,
    progress: Option<mpsc::Sender<FrameOutcome>>,
) -> Result<IdentityTemplate, EngineError> {
    let mut pipeline =
        EnrollmentPipeline::new(&mut *detector, &mut *embedder, config.enroll_config());

    while !pipeline.is_complete() {
        // Stream end and caller disconnect look the same here; both
        // finalize with whatever was collected.
        let Some(frame) = frames.blocking_recv() else {
            tracing::debug!(
                identity_id,
                accepted = pipeline.accepted(),
                "enroll stream ended"
            );
            break;
        };

        let outcome = pipeline.ingest(&frame)?;
        if let Some(tx) = &progress {
            // Progress is best-effort; a disappeared listener does not
            // abort enrollment.
            let _ = tx.blocking_send(outcome);
        }
    }

    let template = pipeline.finalize(identity_id, Utc::now())?;
    store.put_template(&template)?;
    cache.invalidate();
    tracing::info!(
        identity_id,
        samples = template.sample_count,
        "template enrolled"
    );
    Ok(template)
}

fn run_match(
    detector: &mut Box<dyn FaceDetector>,
    embedder: &mut Box<dyn FaceEmbedder>,
    cache: &mut TemplateCache,
    config: &EngineConfig,
    frame: &Frame,
) -> Result<MatchOutcome, EngineError> {
    let mut engine = RecognitionEngine::new(
        &mut *detector,
        &mut *embedder,
        config.similarity_threshold,
    );
    let outcome = engine.match_frame(frame, cache.templates()?)?;
    Ok(outcome)
}
