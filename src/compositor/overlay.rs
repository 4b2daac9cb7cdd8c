use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::ObjectDetection;

use super::ObjectRole;

const CAPTION_SCALE: f32 = 16.0;
const OUTLINE_THICKNESS: i32 = 2;

/// Debug rendering of object detections: outlines plus optional captions.
pub struct DebugOverlay {
    font: Option<FontVec>,
}

impl DebugOverlay {
    /// Overlay without captions.
    pub fn outlines_only() -> Self {
        Self { font: None }
    }

    /// Load the caption font, if one is configured.
    pub fn load(font_path: Option<&Path>) -> Result<Self> {
        let Some(path) = font_path else {
            log::info!("debug overlay captions off: no debug font configured");
            return Ok(Self::outlines_only());
        };
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read debug font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid debug font {}: {}", path.display(), e))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw(&self, canvas: &mut RgbImage, detection: &ObjectDetection, role: ObjectRole) {
        let (width, height) = canvas.dimensions();
        let Some(bbox) = detection.bbox.clipped(width, height) else {
            return;
        };
        let color = role.color();

        for inset in 0..OUTLINE_THICKNESS {
            let w = bbox.width - 2 * inset;
            let h = bbox.height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(bbox.x + inset, bbox.y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        if let Some(font) = &self.font {
            let caption = caption(detection);
            let y = (bbox.y - CAPTION_SCALE as i32 - 2).max(0);
            draw_text_mut(
                canvas,
                color,
                bbox.x,
                y,
                PxScale::from(CAPTION_SCALE),
                font,
                &caption,
            );
        }
    }
}

/// `"{label} {confidence}"` with two decimals.
pub fn caption(detection: &ObjectDetection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

impl ObjectRole {
    /// Outline colour used in debug mode.
    pub fn color(self) -> Rgb<u8> {
        match self {
            ObjectRole::Primary => Rgb([0, 220, 0]),
            ObjectRole::SameLabel => Rgb([255, 160, 0]),
            ObjectRole::Document => Rgb([230, 0, 0]),
            ObjectRole::IdCardShaped => Rgb([220, 0, 220]),
            ObjectRole::Visible => Rgb([160, 160, 160]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn caption_uses_two_decimals() {
        let det = ObjectDetection::new("person", BoundingBox::new(0, 0, 1, 1), 0.876);
        assert_eq!(caption(&det), "person 0.88");
    }

    #[test]
    fn outline_is_drawn_on_box_edges() {
        let mut canvas = RgbImage::new(50, 50);
        let det = ObjectDetection::new("book", BoundingBox::new(10, 10, 20, 20), 0.5);
        DebugOverlay::outlines_only().draw(&mut canvas, &det, ObjectRole::Document);
        assert_eq!(*canvas.get_pixel(10, 10), ObjectRole::Document.color());
        assert_eq!(*canvas.get_pixel(11, 20), ObjectRole::Document.color());
        assert_eq!(*canvas.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(DebugOverlay::load(Some(Path::new("/nonexistent/font.ttf"))).is_err());
        assert!(!DebugOverlay::load(None).unwrap().has_font());
    }
}
