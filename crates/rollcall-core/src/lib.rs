//! rollcall-core — Face detection, embedding, and identity matching.
//!
//! Uses SCRFD for face detection and a FaceNet-style 512-d embedding
//! model, both running via ONNX Runtime for CPU inference. Matching is
//! Euclidean nearest-neighbor against an in-memory gallery.

pub mod detector;
pub mod embedder;
pub mod encoder;
pub mod gallery;
pub mod matcher;
pub mod types;

pub use encoder::{EncodeError, Encoder, FaceEncoder};
pub use gallery::Gallery;
pub use matcher::{recognize, MatchLabel, MatchOutcome};
pub use types::{BoundingBox, DetectedFace, Embedding};
