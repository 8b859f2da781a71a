//! Face Embedding Provider — one call from frame pixels to embeddings.
//!
//! Wraps detection and embedding: detect bounding boxes, crop each box,
//! embed the crop. Boxes whose intersection with the frame is empty are
//! silently skipped; a frame with no detections yields an empty vec.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::DetectedFace;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("frame buffer malformed: expected {expected} bytes for {width}x{height} RGB, got {actual}")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Strategy seam for producing per-face embeddings from a frame.
///
/// The production implementation is [`FaceEncoder`]; tests substitute
/// scripted encoders.
pub trait Encoder: Send {
    /// Encode all faces in an RGB24 frame, in detector output order.
    fn encode(&mut self, rgb: &[u8], width: u32, height: u32)
        -> Result<Vec<DetectedFace>, EncodeError>;
}

/// Detector + embedder pipeline. One instance per camera worker; the
/// underlying ONNX sessions are not shared across threads.
pub struct FaceEncoder {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl FaceEncoder {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(detector_path: &Path, embedder_path: &Path) -> Result<Self, EncodeError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            embedder: FaceEmbedder::load(embedder_path)?,
        })
    }
}

impl Encoder for FaceEncoder {
    fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, EncodeError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(EncodeError::MalformedFrame {
                width,
                height,
                expected,
                actual: rgb.len(),
            });
        }

        let boxes = self.detector.detect(rgb, width, height)?;
        let mut faces = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            // Degenerate crops are skipped, not an error.
            let Some(rect) = bbox.crop_rect(width, height) else {
                tracing::debug!(?bbox, "skipping degenerate face crop");
                continue;
            };

            let mut crop = RgbImage::new(rect.width, rect.height);
            for y in 0..rect.height {
                for x in 0..rect.width {
                    let base = (((rect.y + y) * width + rect.x + x) * 3) as usize;
                    crop.put_pixel(x, y, image::Rgb([rgb[base], rgb[base + 1], rgb[base + 2]]));
                }
            }

            let embedding = self.embedder.embed(&crop)?;
            faces.push(DetectedFace { bbox, embedding });
        }

        Ok(faces)
    }
}
