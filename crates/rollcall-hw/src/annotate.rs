//! Frame annotation — bounding boxes drawn into pixels, labels carried
//! alongside for sinks that can render text.

use crate::frame::Frame;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use rollcall_core::BoundingBox;

const RECOGNIZED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNRECOGNIZED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i32 = 2;

/// One annotated face: box geometry plus the label a sink may render.
#[derive(Debug, Clone)]
pub struct OverlayEntry {
    pub bbox: BoundingBox,
    pub label: String,
    pub recognized: bool,
}

/// Per-frame annotation data. The banner is the attendance transition
/// text ("ada, checked in." etc.) shown for the most recent match.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    pub entries: Vec<OverlayEntry>,
    pub banner: Option<String>,
}

impl Overlay {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.banner.is_none()
    }
}

/// Draw hollow boxes for every overlay entry into the frame pixels.
/// Green for recognized faces, red otherwise. Boxes fully outside the
/// frame are ignored.
pub fn annotate_frame(frame: &mut Frame, overlay: &Overlay) {
    let (width, height) = (frame.width, frame.height);
    let Some(mut img) = RgbImage::from_raw(width, height, std::mem::take(&mut frame.data)) else {
        // Malformed buffer; leave the frame untouched.
        return;
    };

    for entry in &overlay.entries {
        let Some(rect) = entry.bbox.crop_rect(width, height) else {
            continue;
        };
        let color = if entry.recognized { RECOGNIZED_COLOR } else { UNRECOGNIZED_COLOR };

        for inset in 0..BOX_THICKNESS {
            let w = rect.width as i32 - 2 * inset;
            let h = rect.height as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut img,
                Rect::at(rect.x as i32 + inset, rect.y as i32 + inset)
                    .of_size(w as u32, h as u32),
                color,
            );
        }
    }

    frame.data = img.into_raw();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![0u8; (width * height * 3) as usize], width, height, 1)
    }

    fn entry(x: f32, y: f32, w: f32, h: f32, recognized: bool) -> OverlayEntry {
        OverlayEntry {
            bbox: BoundingBox { x, y, width: w, height: h, confidence: 1.0 },
            label: "test".into(),
            recognized,
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let base = ((y * frame.width + x) * 3) as usize;
        [frame.data[base], frame.data[base + 1], frame.data[base + 2]]
    }

    #[test]
    fn test_annotate_draws_green_box_for_recognized() {
        let mut frame = blank_frame(64, 64);
        let overlay = Overlay {
            entries: vec![entry(10.0, 10.0, 20.0, 20.0, true)],
            banner: None,
        };
        annotate_frame(&mut frame, &overlay);

        assert_eq!(pixel(&frame, 10, 10), [0, 255, 0]);
        // Interior stays untouched.
        assert_eq!(pixel(&frame, 20, 20), [0, 0, 0]);
    }

    #[test]
    fn test_annotate_draws_red_box_for_unrecognized() {
        let mut frame = blank_frame(64, 64);
        let overlay = Overlay {
            entries: vec![entry(5.0, 5.0, 10.0, 10.0, false)],
            banner: None,
        };
        annotate_frame(&mut frame, &overlay);
        assert_eq!(pixel(&frame, 5, 5), [255, 0, 0]);
    }

    #[test]
    fn test_annotate_ignores_out_of_frame_box() {
        let mut frame = blank_frame(32, 32);
        let before = frame.data.clone();
        let overlay = Overlay {
            entries: vec![entry(100.0, 100.0, 10.0, 10.0, true)],
            banner: None,
        };
        annotate_frame(&mut frame, &overlay);
        assert_eq!(frame.data, before);
    }

    #[test]
    fn test_empty_overlay() {
        let overlay = Overlay::default();
        assert!(overlay.is_empty());

        let mut frame = blank_frame(8, 8);
        let before = frame.data.clone();
        annotate_frame(&mut frame, &overlay);
        assert_eq!(frame.data, before);
    }
}
