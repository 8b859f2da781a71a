use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in original-frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Integer crop rectangle clamped to frame bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Clamp the box to the frame and round to pixel coordinates.
    ///
    /// Returns `None` when the intersection with the frame is empty —
    /// a degenerate crop that callers skip rather than treat as an error.
    pub fn crop_rect(&self, frame_width: u32, frame_height: u32) -> Option<CropRect> {
        let x1 = self.x.max(0.0).floor() as i64;
        let y1 = self.y.max(0.0).floor() as i64;
        let x2 = ((self.x + self.width).ceil() as i64).min(frame_width as i64);
        let y2 = ((self.y + self.height).ceil() as i64).min(frame_height as i64);

        if x2 <= x1 || y2 <= y1 || x1 >= frame_width as i64 || y1 >= frame_height as i64 {
            return None;
        }

        Some(CropRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// Face embedding vector (512-dimensional for the reference model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Compute Euclidean distance to another embedding.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A detected face paired with its embedding, one per detector hit.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 1.0 }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding { values: vec![1.0, 2.0, 3.0] };
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_unit_axes() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![0.0, 1.0] };
        assert!((a.euclidean_distance(&b) - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_crop_rect_inside_frame() {
        let rect = make_bbox(10.0, 20.0, 30.0, 40.0).crop_rect(640, 480).unwrap();
        assert_eq!(rect, CropRect { x: 10, y: 20, width: 30, height: 40 });
    }

    #[test]
    fn test_crop_rect_clamps_to_frame() {
        let rect = make_bbox(-5.0, -5.0, 50.0, 50.0).crop_rect(640, 480).unwrap();
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.width, 45);
        assert_eq!(rect.height, 45);
    }

    #[test]
    fn test_crop_rect_degenerate_is_none() {
        // Entirely outside the frame
        assert!(make_bbox(700.0, 10.0, 20.0, 20.0).crop_rect(640, 480).is_none());
        // Zero-area box
        assert!(make_bbox(10.0, 10.0, 0.0, 0.0).crop_rect(640, 480).is_none());
    }
}
