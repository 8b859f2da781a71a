//! Face embedding model via ONNX Runtime.
//!
//! Produces 512-dimensional identity embeddings from face crops. Crops
//! are resized to a fixed square input and normalized to [0, 1]; the
//! output vector is L2-normalized so Euclidean distances land in a
//! stable range for thresholding.

use crate::types::Embedding;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBED_INPUT_SIZE: u32 = 160;
const EMBED_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FaceNet-style embedding extractor.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded embedding model");

        Ok(Self { session })
    }

    /// Embed a face crop. The crop is resized to the model's square
    /// input resolution before inference; callers pass the raw crop.
    pub fn embed(&mut self, crop: &RgbImage) -> Result<Embedding, EmbedderError> {
        let resized = if crop.dimensions() == (EMBED_INPUT_SIZE, EMBED_INPUT_SIZE) {
            crop.clone()
        } else {
            image::imageops::resize(crop, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE, FilterType::Triangle)
        };

        let input = Self::preprocess(&resized);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();
        if raw.len() != EMBED_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding { values: l2_normalize(raw) })
    }

    /// Pack a square RGB crop into a NCHW float tensor normalized to [0, 1].
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let size = EMBED_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in face.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        tensor
    }
}

fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}
