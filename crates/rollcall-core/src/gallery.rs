//! Identity gallery — the in-memory (embedding, name) set for one
//! recognition cycle.

use crate::encoder::{EncodeError, Encoder};
use crate::types::Embedding;
use image::RgbImage;

/// A reference image paired with the identity it belongs to.
pub struct GalleryEntry {
    pub name: String,
    pub image: RgbImage,
}

/// Parallel-indexed embeddings and display names. Built once per cycle
/// and shared read-only; a refreshed roster produces a new `Gallery`
/// rather than mutating one in use.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    pub embeddings: Vec<Embedding>,
    pub names: Vec<String>,
}

impl Gallery {
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Build a gallery by encoding each identity's reference image.
    ///
    /// An identity whose reference image yields zero embeddings is
    /// excluded — currently unrecognizable, not an error. A reference
    /// image with several faces contributes each of them under the same
    /// name, matching how the enrollment photos are ingested upstream.
    pub fn build(encoder: &mut dyn Encoder, entries: &[GalleryEntry]) -> Result<Self, EncodeError> {
        let mut gallery = Gallery::default();

        for entry in entries {
            let (w, h) = entry.image.dimensions();
            let faces = encoder.encode(entry.image.as_raw(), w, h)?;

            if faces.is_empty() {
                tracing::debug!(name = %entry.name, "reference image yielded no faces; excluding");
                continue;
            }

            for face in faces {
                gallery.embeddings.push(face.embedding);
                gallery.names.push(entry.name.clone());
            }
        }

        tracing::debug!(
            identities = entries.len(),
            gallery_size = gallery.len(),
            "gallery built"
        );

        Ok(gallery)
    }
}
