use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates.
///
/// Detectors may report boxes that extend past the frame; callers clip with
/// [`BoundingBox::clipped`] before touching pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        (self.width.max(0) as i64) * (self.height.max(0) as i64)
    }

    /// Width over height, or 0 when the box has no height.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Grow the box by `pad` pixels on every side.
    pub fn padded(&self, pad: u32) -> Self {
        let pad = pad.min(i32::MAX as u32 / 4) as i32;
        Self {
            x: self.x.saturating_sub(pad),
            y: self.y.saturating_sub(pad),
            width: self.width.saturating_add(pad.saturating_mul(2)),
            height: self.height.saturating_add(pad.saturating_mul(2)),
        }
    }

    /// Intersect with a `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clipped(&self, frame_width: u32, frame_height: u32) -> Option<Self> {
        let x0 = (self.x as i64).max(0);
        let y0 = (self.y as i64).max(0);
        let x1 = (self.x as i64 + self.width as i64).min(frame_width as i64);
        let y1 = (self.y as i64 + self.height as i64).min(frame_height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as i32,
            height: (y1 - y0) as i32,
        })
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &Self) -> Self {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width).max(other.x + other.width);
        let y1 = (self.y + self.height).max(other.y + other.height);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Text is reported as bare boxes. Sets are unordered and may hold duplicates.
pub type TextRegion = BoundingBox;

/// Labelled object reported by an [`crate::detect::ObjectDetector`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub bbox: BoundingBox,
    pub label: String,
    /// 0..=1
    pub confidence: f32,
}

impl ObjectDetection {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            confidence,
        }
    }
}

/// One completed detection cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub text_regions: Vec<TextRegion>,
    pub objects: Vec<ObjectDetection>,
    /// Track frame count of the frame this result was computed from.
    pub frame_count: u64,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.text_regions.is_empty() && self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipping_keeps_the_visible_part() {
        let b = BoundingBox::new(-10, 5, 40, 200);
        assert_eq!(b.clipped(100, 100), Some(BoundingBox::new(0, 5, 30, 95)));
    }

    #[test]
    fn clipping_outside_frame_is_none() {
        assert_eq!(BoundingBox::new(120, 0, 10, 10).clipped(100, 100), None);
        assert_eq!(BoundingBox::new(10, 10, 0, 10).clipped(100, 100), None);
        assert_eq!(BoundingBox::new(10, 10, -5, 10).clipped(100, 100), None);
    }

    #[test]
    fn padding_grows_every_side() {
        let b = BoundingBox::new(400, 0, 100, 100).padded(10);
        assert_eq!(b, BoundingBox::new(390, -10, 120, 120));
        assert_eq!(b.clipped(640, 480), Some(BoundingBox::new(390, 0, 120, 110)));
    }

    #[test]
    fn aspect_ratio_handles_zero_height() {
        assert_eq!(BoundingBox::new(0, 0, 10, 0).aspect_ratio(), 0.0);
        let card = BoundingBox::new(0, 0, 100, 65).aspect_ratio();
        assert!((card - 1.538).abs() < 0.01);
    }

    #[test]
    fn union_covers_both() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(20, 5, 5, 20);
        assert_eq!(a.union(&b), BoundingBox::new(0, 0, 25, 25));
    }
}
