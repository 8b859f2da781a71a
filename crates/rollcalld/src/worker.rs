//! Camera worker — one capture-and-recognize loop per configured camera.

use crate::cache::{CacheError, GalleryCache};
use crate::interfaces::SourceError;
use crate::sink::{PresentationSink, SinkAction};
use crate::tracker::AttendanceTracker;
use chrono::Utc;
use rollcall_core::{recognize, EncodeError, Encoder, Embedding};
use rollcall_hw::{annotate_frame, CameraSource, CaptureError, FrameSource, Overlay, OverlayEntry};
use rollcall_store::CameraConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Opens capture sources for workers. Injectable so tests run scripted
/// streams instead of real devices.
pub trait SourceFactory: Send + Sync {
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Production factory: V4L2 for device indices, MJPEG-over-HTTP for URLs.
pub struct HwSourceFactory;

impl SourceFactory for HwSourceFactory {
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        rollcall_hw::open_source(&CameraSource::parse(&config.source))
    }
}

/// Builds one embedding provider per worker; inference sessions are not
/// shared across camera threads.
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Encoder>, EncodeError>;
}

/// Loads the ONNX detector + embedder pair per worker.
pub struct OrtEncoderFactory {
    pub detector_path: PathBuf,
    pub embedder_path: PathBuf,
}

impl EncoderFactory for OrtEncoderFactory {
    fn create(&self) -> Result<Box<dyn Encoder>, EncodeError> {
        Ok(Box::new(rollcall_core::FaceEncoder::load(
            &self.detector_path,
            &self.embedder_path,
        )?))
    }
}

/// Shared handles a worker needs; cheap to clone per camera thread.
#[derive(Clone)]
pub struct WorkerContext {
    pub roster: Arc<GalleryCache>,
    pub tracker: Arc<AttendanceTracker>,
    pub sink: Arc<dyn PresentationSink>,
    pub sources: Arc<dyn SourceFactory>,
    pub encoders: Arc<dyn EncoderFactory>,
    /// Consecutive per-frame failures tolerated before terminating.
    pub max_consecutive_failures: u32,
}

/// Terminal status of one worker, reported to the orchestrator.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub camera: String,
    pub error: Option<String>,
}

#[derive(Error, Debug)]
enum WorkerError {
    #[error("{0}")]
    Capture(#[from] CaptureError),
    #[error("encoder: {0}")]
    Encoder(#[from] EncodeError),
    #[error("gallery: {0}")]
    Roster(#[from] CacheError),
    #[error("attendance: {0}")]
    Tracker(#[from] SourceError),
    #[error("presentation: {0}")]
    Sink(String),
    #[error("no frames read from {0}")]
    NoFrames(String),
}

/// Run one camera to completion. Cleanup (source release, sink close)
/// happens on every exit path; the report carries any captured error.
pub fn run_worker(config: &CameraConfig, ctx: &WorkerContext, stop: &AtomicBool) -> WorkerReport {
    let result = worker_loop(config, ctx, stop);

    // Source is dropped by worker_loop's scope; close our display surface.
    ctx.sink.close(&config.name);

    match &result {
        Ok(()) => tracing::info!(camera = %config.name, "camera worker stopped"),
        Err(e) => tracing::error!(camera = %config.name, error = %e, "camera worker failed"),
    }

    WorkerReport {
        camera: config.name.clone(),
        error: result.err().map(|e| e.to_string()),
    }
}

fn worker_loop(
    config: &CameraConfig,
    ctx: &WorkerContext,
    stop: &AtomicBool,
) -> Result<(), WorkerError> {
    let mut encoder = ctx.encoders.create()?;
    // Fail fast before the loop if the source cannot be opened.
    let mut source = ctx.sources.open(config)?;
    tracing::info!(
        camera = %config.name,
        source = %source.describe(),
        threshold = config.threshold,
        "camera worker started"
    );

    let mut frames_read = 0u64;
    let mut consecutive_read_failures = 0u32;
    let mut consecutive_encode_failures = 0u32;

    while !stop.load(Ordering::Acquire) {
        let mut frame = match source.read_frame() {
            Ok(Some(frame)) => {
                consecutive_read_failures = 0;
                frames_read += 1;
                frame
            }
            Ok(None) => {
                // End of stream is a clean stop unless nothing was ever read.
                if frames_read == 0 {
                    return Err(WorkerError::NoFrames(source.describe()));
                }
                tracing::info!(camera = %config.name, frames = frames_read, "end of stream");
                break;
            }
            Err(e) => {
                consecutive_read_failures += 1;
                tracing::warn!(
                    camera = %config.name,
                    error = %e,
                    consecutive = consecutive_read_failures,
                    "frame read failed"
                );
                if consecutive_read_failures >= ctx.max_consecutive_failures {
                    if frames_read == 0 {
                        return Err(WorkerError::Capture(e));
                    }
                    // A stream that stalls after producing frames ends cleanly.
                    tracing::info!(camera = %config.name, "stream stalled; stopping");
                    break;
                }
                continue;
            }
        };

        let faces = match encoder.encode(&frame.data, frame.width, frame.height) {
            Ok(faces) => {
                consecutive_encode_failures = 0;
                faces
            }
            Err(e) => {
                // Inference failures are transient: skip this frame's
                // recognition, keep the loop alive within the bound.
                consecutive_encode_failures += 1;
                tracing::warn!(
                    camera = %config.name,
                    error = %e,
                    consecutive = consecutive_encode_failures,
                    "inference failed; skipping frame"
                );
                if consecutive_encode_failures >= ctx.max_consecutive_failures {
                    return Err(WorkerError::Encoder(e));
                }
                continue;
            }
        };

        let mut overlay = Overlay::default();

        if !faces.is_empty() {
            let roster = ctx.roster.snapshot()?;
            let probes: Vec<Embedding> =
                faces.iter().map(|face| face.embedding.clone()).collect();
            let outcomes = recognize(&roster.gallery, &probes, config.threshold);

            for (face, outcome) in faces.iter().zip(&outcomes) {
                match outcome.name() {
                    Some(name) => {
                        let Some(&identity_id) = roster.ids_by_name.get(name) else {
                            tracing::warn!(camera = %config.name, name, "matched name missing from roster");
                            continue;
                        };
                        let transition = ctx.tracker.observe(identity_id, name, Utc::now())?;
                        overlay.banner = Some(transition.banner(name));
                        overlay.entries.push(OverlayEntry {
                            bbox: face.bbox.clone(),
                            label: name.to_string(),
                            recognized: true,
                        });
                    }
                    None => overlay.entries.push(OverlayEntry {
                        bbox: face.bbox.clone(),
                        label: "Not Recognized".to_string(),
                        recognized: false,
                    }),
                }
            }
        }

        annotate_frame(&mut frame, &overlay);

        match ctx.sink.show(&config.name, &frame, &overlay) {
            Ok(SinkAction::Continue) => {}
            Ok(SinkAction::Stop) => {
                // Quit requested at the display: stop this camera only.
                tracing::info!(camera = %config.name, "stop requested by presentation sink");
                stop.store(true, Ordering::Release);
            }
            Err(e) => return Err(WorkerError::Sink(e.to_string())),
        }
    }

    Ok(())
}
