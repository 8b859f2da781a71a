//! rollcall-hw — camera capture and frame annotation.
//!
//! Capture speaks V4L2 for local device indices and MJPEG-over-HTTP for
//! network cameras, both behind the [`FrameSource`] trait so workers
//! and tests never depend on a concrete backend.

pub mod annotate;
pub mod capture;
pub mod frame;

pub use annotate::{annotate_frame, Overlay, OverlayEntry};
pub use capture::{open_source, CameraSource, CaptureError, FrameSource, MjpegSource, V4lSource};
pub use frame::Frame;
