//! Euclidean nearest-neighbor matching against a gallery.

use crate::gallery::Gallery;
use crate::types::Embedding;

/// Outcome label for one probe embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchLabel {
    Known(String),
    NotRecognized,
}

/// One result per probe: nearest gallery identity (if under threshold)
/// and the distance to the nearest neighbor.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub label: MatchLabel,
    pub distance: f32,
}

impl MatchOutcome {
    pub fn name(&self) -> Option<&str> {
        match &self.label {
            MatchLabel::Known(name) => Some(name),
            MatchLabel::NotRecognized => None,
        }
    }
}

/// Classify each probe against the gallery with a per-camera threshold.
///
/// A probe matches iff its minimum distance is strictly below the
/// threshold; a distance exactly equal to the threshold is not a match.
/// Ties on the minimum resolve to the first occurrence in gallery order.
/// An empty gallery classifies every probe as not recognized.
pub fn recognize(gallery: &Gallery, probes: &[Embedding], threshold: f32) -> Vec<MatchOutcome> {
    probes
        .iter()
        .map(|probe| {
            let mut best_distance = f32::INFINITY;
            let mut best_idx: Option<usize> = None;

            for (i, known) in gallery.embeddings.iter().enumerate() {
                let d = probe.euclidean_distance(known);
                // Strict less-than keeps the first occurrence on ties.
                if d < best_distance {
                    best_distance = d;
                    best_idx = Some(i);
                }
            }

            match best_idx {
                Some(idx) if best_distance < threshold => MatchOutcome {
                    label: MatchLabel::Known(gallery.names[idx].clone()),
                    distance: best_distance,
                },
                _ => MatchOutcome {
                    label: MatchLabel::NotRecognized,
                    distance: best_distance,
                },
            }
        })
        .collect()
}
