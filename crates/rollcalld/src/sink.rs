//! Presentation sinks — where annotated frames go.
//!
//! Display is abstract so deployments choose their own surface: a no-op
//! sink for headless runs, a JPEG export sink for review, or an
//! interactive adapter that can request its worker to stop (the quit
//! key of a windowed deployment). GUI toolkits that demand a single UI
//! thread sit behind the same trait, marshalling frames internally.

use rollcall_hw::{Frame, Overlay};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encode failed: {0}")]
    Encode(String),
}

/// Feedback from presenting one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAction {
    Continue,
    /// The sink's user asked this camera's worker to stop.
    Stop,
}

pub trait PresentationSink: Send + Sync {
    fn show(&self, camera: &str, frame: &Frame, overlay: &Overlay) -> Result<SinkAction, SinkError>;
    /// Close any surface owned for this camera. Idempotent.
    fn close(&self, camera: &str);
}

/// Headless deployment: frames are dropped after annotation.
pub struct NullSink;

impl PresentationSink for NullSink {
    fn show(&self, _camera: &str, _frame: &Frame, _overlay: &Overlay) -> Result<SinkAction, SinkError> {
        Ok(SinkAction::Continue)
    }

    fn close(&self, _camera: &str) {}
}

/// Writes each annotated frame as `{camera}-{sequence}.jpg` under the
/// export directory.
pub struct FrameExportSink {
    dir: PathBuf,
}

impl FrameExportSink {
    pub fn new(dir: &Path) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn frame_path(&self, camera: &str, sequence: u64) -> PathBuf {
        self.dir.join(format!("{camera}-{sequence:06}.jpg"))
    }
}

impl PresentationSink for FrameExportSink {
    fn show(&self, camera: &str, frame: &Frame, overlay: &Overlay) -> Result<SinkAction, SinkError> {
        let path = self.frame_path(camera, frame.sequence);
        image::save_buffer(
            &path,
            &frame.data,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| SinkError::Encode(e.to_string()))?;

        if let Some(banner) = &overlay.banner {
            tracing::debug!(camera, path = %path.display(), banner, "frame exported");
        }
        Ok(SinkAction::Continue)
    }

    fn close(&self, camera: &str) {
        tracing::debug!(camera, "export sink closed");
    }
}
