//! Turns a frame plus the cached detection result into the outgoing frame.
//!
//! Two passes, in order:
//!
//! 1. Text: padded text boxes are blurred from the original pixels.
//! 2. Objects: the largest primary-label detection stays visible; other
//!    same-label detections, document labels and card-shaped objects are
//!    blurred from the text-pass output. In debug mode they are outlined
//!    instead.
//!
//! Compositing never fails outward: any error or panic yields the input frame.

mod blur;
mod mask;
mod overlay;

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::config::{IdCardHeuristic, RedactConfig};
use crate::detect::{BoundingBox, DetectionResult, ObjectDetection};
use crate::frame::Frame;

pub use blur::{blur_masked, gaussian_kernel};
pub use mask::Mask;
pub use overlay::{caption, DebugOverlay};

/// How one object detection is treated by the object pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectRole {
    /// Largest detection with the primary label. Never blurred.
    Primary,
    /// Primary label, but not the primary subject.
    SameLabel,
    /// Label is in the document set.
    Document,
    /// Passes the ID-card size and aspect test.
    IdCardShaped,
    /// Left untouched.
    Visible,
}

impl ObjectRole {
    pub fn is_redacted(self) -> bool {
        matches!(
            self,
            ObjectRole::SameLabel | ObjectRole::Document | ObjectRole::IdCardShaped
        )
    }
}

/// Rules deciding which objects are redacted.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRules {
    pub primary_label: String,
    pub document_labels: BTreeSet<String>,
    pub id_card: IdCardHeuristic,
}

impl ObjectRules {
    pub fn from_config(config: &RedactConfig) -> Self {
        Self {
            primary_label: config.primary_label.clone(),
            document_labels: config.document_labels.clone(),
            id_card: config.id_card,
        }
    }

    /// Index of the largest-area detection carrying the primary label.
    /// Ties keep the first one encountered.
    pub fn primary_subject(&self, objects: &[ObjectDetection]) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (idx, object) in objects.iter().enumerate() {
            if object.label != self.primary_label {
                continue;
            }
            let area = object.bbox.area();
            if best.map_or(true, |(_, best_area)| area > best_area) {
                best = Some((idx, area));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Role of every detection, in input order.
    pub fn classify(&self, objects: &[ObjectDetection]) -> Vec<ObjectRole> {
        let primary = self.primary_subject(objects);
        objects
            .iter()
            .enumerate()
            .map(|(idx, object)| {
                if object.label == self.primary_label {
                    if Some(idx) == primary {
                        ObjectRole::Primary
                    } else {
                        ObjectRole::SameLabel
                    }
                } else if self.document_labels.contains(&object.label) {
                    ObjectRole::Document
                } else if self.id_card.matches(&object.bbox) {
                    ObjectRole::IdCardShaped
                } else {
                    ObjectRole::Visible
                }
            })
            .collect()
    }
}

/// Blur/overlay compositor for one pipeline configuration.
pub struct BlurCompositor {
    kernel: Vec<f32>,
    debug_mode: bool,
    enable_object_detection: bool,
    rules: ObjectRules,
    text_padding: u32,
    object_padding: u32,
    overlay: DebugOverlay,
}

impl BlurCompositor {
    pub fn new(config: &RedactConfig) -> Result<Self> {
        let overlay = if config.debug_mode {
            DebugOverlay::load(config.debug_font_path.as_deref())?
        } else {
            DebugOverlay::outlines_only()
        };
        Ok(Self {
            kernel: gaussian_kernel(config.blur_strength)?,
            debug_mode: config.debug_mode,
            enable_object_detection: config.enable_object_detection,
            rules: ObjectRules::from_config(config),
            text_padding: config.text_padding,
            object_padding: config.object_padding,
            overlay,
        })
    }

    /// Output frame for `frame` given the cached detection result.
    ///
    /// Always returns a frame with the input's timestamp and time base; on
    /// any failure that frame is an unmodified copy of the input.
    pub fn composite(&self, frame: &Frame, cached: Option<&DetectionResult>) -> Frame {
        let Some(result) = cached else {
            return frame.clone();
        };
        match catch_unwind(AssertUnwindSafe(|| self.try_composite(frame, result))) {
            Ok(Ok(Some(image))) => frame.with_image(image),
            Ok(Ok(None)) => frame.clone(),
            Ok(Err(e)) => {
                log::warn!("compositing failed, passing frame through: {:#}", e);
                frame.clone()
            }
            Err(_) => {
                log::error!("compositing panicked, passing frame through");
                frame.clone()
            }
        }
    }

    /// `Ok(None)` when nothing needs to change.
    fn try_composite(
        &self,
        frame: &Frame,
        result: &DetectionResult,
    ) -> Result<Option<RgbImage>> {
        let original = frame.image();
        let (width, height) = original.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        if original.as_raw().len() != width as usize * height as usize * 3 {
            return Err(anyhow!("frame buffer does not match {}x{}", width, height));
        }

        let mut working: Option<RgbImage> = None;

        if !result.text_regions.is_empty() {
            let mask = region_mask(width, height, &result.text_regions, self.text_padding);
            if !mask.is_empty() {
                working = Some(blur_masked(original, &mask, &self.kernel)?);
            }
        }

        if self.enable_object_detection && !result.objects.is_empty() {
            let roles = self.rules.classify(&result.objects);
            if self.debug_mode {
                let mut canvas = working.take().unwrap_or_else(|| original.clone());
                for (object, role) in result.objects.iter().zip(&roles) {
                    self.overlay.draw(&mut canvas, object, *role);
                }
                working = Some(canvas);
            } else {
                let marked: Vec<BoundingBox> = result
                    .objects
                    .iter()
                    .zip(&roles)
                    .filter(|(_, role)| role.is_redacted())
                    .map(|(object, _)| object.bbox)
                    .collect();
                let mask = region_mask(width, height, &marked, self.object_padding);
                if !mask.is_empty() {
                    let blurred = {
                        let current = working.as_ref().unwrap_or(original);
                        blur_masked(current, &mask, &self.kernel)?
                    };
                    working = Some(blurred);
                }
            }
        }

        Ok(working)
    }
}

fn region_mask(width: u32, height: u32, regions: &[BoundingBox], padding: u32) -> Mask {
    let mut mask = Mask::new(width, height);
    for region in regions {
        if let Some(rect) = region.padded(padding).clipped(width, height) {
            mask.fill(&rect);
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TimeBase;
    use image::Rgb;

    fn textured_frame(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 37 + y * 11) % 256) as u8,
                ((x * 5 + y * 53) % 256) as u8,
                ((x ^ y) % 256) as u8,
            ])
        });
        Frame::new(image, 3003, TimeBase::new(1, 30_000).unwrap())
    }

    fn objects(objects: Vec<ObjectDetection>) -> DetectionResult {
        DetectionResult {
            objects,
            ..DetectionResult::default()
        }
    }

    fn person(x: i32, y: i32, w: i32, h: i32) -> ObjectDetection {
        ObjectDetection::new("person", BoundingBox::new(x, y, w, h), 0.9)
    }

    fn inside(b: &BoundingBox, x: u32, y: u32) -> bool {
        let (x, y) = (x as i32, y as i32);
        x >= b.x && x < b.right() && y >= b.y && y < b.bottom()
    }

    fn mse(a: &RgbImage, b: &RgbImage, region: &BoundingBox) -> f64 {
        let mut total = 0f64;
        let mut count = 0usize;
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                let pa = a.get_pixel(x as u32, y as u32);
                let pb = b.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    let d = pa[c] as f64 - pb[c] as f64;
                    total += d * d;
                    count += 1;
                }
            }
        }
        total / count as f64
    }

    fn compositor(config: RedactConfig) -> BlurCompositor {
        BlurCompositor::new(&config).unwrap()
    }

    #[test]
    fn empty_result_returns_input() {
        let frame = textured_frame(64, 48);
        let out = compositor(RedactConfig::default())
            .composite(&frame, Some(&DetectionResult::default()));
        assert_eq!(out, frame);
        let out = compositor(RedactConfig::default()).composite(&frame, None);
        assert_eq!(out, frame);
    }

    #[test]
    fn lone_person_is_not_blurred() {
        let frame = textured_frame(640, 480);
        let result = objects(vec![person(0, 0, 200, 400)]);
        let out = compositor(RedactConfig::default()).composite(&frame, Some(&result));
        assert_eq!(out.image(), frame.image());
        assert_eq!(out.pts, frame.pts);
        assert_eq!(out.time_base, frame.time_base);
    }

    #[test]
    fn smaller_person_is_blurred_and_primary_kept() {
        let frame = textured_frame(640, 480);
        let result = objects(vec![person(0, 0, 200, 400), person(400, 0, 100, 100)]);
        let out = compositor(RedactConfig::default()).composite(&frame, Some(&result));

        let padded_b = BoundingBox::new(400, 0, 100, 100)
            .padded(10)
            .clipped(640, 480)
            .unwrap();
        for (x, y, pixel) in out.image().enumerate_pixels() {
            if !inside(&padded_b, x, y) {
                assert_eq!(pixel, frame.image().get_pixel(x, y), "changed at {},{}", x, y);
            }
        }
        assert!(mse(out.image(), frame.image(), &padded_b) > 0.0);
        assert_eq!(
            mse(out.image(), frame.image(), &BoundingBox::new(0, 0, 200, 400)),
            0.0
        );
    }

    #[test]
    fn equal_area_tie_keeps_first_person() {
        let rules = ObjectRules::from_config(&RedactConfig::default());
        let roles = rules.classify(&[person(0, 0, 50, 50), person(100, 0, 50, 50)]);
        assert_eq!(roles, vec![ObjectRole::Primary, ObjectRole::SameLabel]);
    }

    #[test]
    fn id_card_heuristic_marks_card_shapes_only() {
        let rules = ObjectRules::from_config(&RedactConfig::default());
        let roles = rules.classify(&[
            ObjectDetection::new("misc", BoundingBox::new(0, 0, 100, 65), 0.4),
            ObjectDetection::new("misc", BoundingBox::new(200, 0, 60, 60), 0.4),
            ObjectDetection::new("passport", BoundingBox::new(300, 0, 10, 10), 0.4),
        ]);
        assert_eq!(
            roles,
            vec![
                ObjectRole::IdCardShaped,
                ObjectRole::Visible,
                ObjectRole::Document
            ]
        );
    }

    #[test]
    fn text_regions_are_blurred_with_padding() {
        let frame = textured_frame(200, 100);
        let result = DetectionResult {
            text_regions: vec![BoundingBox::new(50, 30, 40, 20)],
            ..DetectionResult::default()
        };
        let out = compositor(RedactConfig::default()).composite(&frame, Some(&result));
        let padded = BoundingBox::new(42, 22, 56, 36);
        for (x, y, pixel) in out.image().enumerate_pixels() {
            if !inside(&padded, x, y) {
                assert_eq!(pixel, frame.image().get_pixel(x, y));
            }
        }
        assert!(mse(out.image(), frame.image(), &padded) > 0.0);
    }

    #[test]
    fn text_regions_outside_frame_change_nothing() {
        let frame = textured_frame(64, 64);
        let result = DetectionResult {
            text_regions: vec![BoundingBox::new(500, 500, 10, 10)],
            ..DetectionResult::default()
        };
        let out = compositor(RedactConfig::default()).composite(&frame, Some(&result));
        assert_eq!(out, frame);
    }

    #[test]
    fn disabled_object_detection_ignores_objects() {
        let frame = textured_frame(320, 240);
        let result = objects(vec![person(0, 0, 100, 100), person(150, 0, 50, 50)]);
        let config = RedactConfig {
            enable_object_detection: false,
            ..RedactConfig::default()
        };
        let out = compositor(config).composite(&frame, Some(&result));
        assert_eq!(out, frame);
    }

    #[test]
    fn debug_mode_outlines_instead_of_blurring() {
        let frame = textured_frame(320, 240);
        let result = objects(vec![person(10, 10, 100, 150), person(200, 20, 60, 60)]);
        let config = RedactConfig {
            debug_mode: true,
            ..RedactConfig::default()
        };
        let out = compositor(config).composite(&frame, Some(&result));

        assert_eq!(*out.image().get_pixel(10, 10), ObjectRole::Primary.color());
        assert_eq!(*out.image().get_pixel(200, 20), ObjectRole::SameLabel.color());
        // Interior of the secondary person is untouched.
        assert_eq!(out.image().get_pixel(230, 50), frame.image().get_pixel(230, 50));
        assert_eq!(out.pts, frame.pts);
    }

    #[test]
    fn text_and_object_passes_compose() {
        let frame = textured_frame(320, 240);
        let secondary = BoundingBox::new(200, 100, 60, 60);
        let result = DetectionResult {
            text_regions: vec![BoundingBox::new(210, 110, 20, 10)],
            objects: vec![
                person(0, 0, 100, 200),
                ObjectDetection::new("person", secondary, 0.9),
            ],
            ..DetectionResult::default()
        };
        let config = RedactConfig::default();
        let out = compositor(config.clone()).composite(&frame, Some(&result));

        let kernel = gaussian_kernel(config.blur_strength).unwrap();
        let text_mask = region_mask(320, 240, &result.text_regions, config.text_padding);
        let object_mask = region_mask(320, 240, &[secondary], config.object_padding);
        let text_pass = blur_masked(frame.image(), &text_mask, &kernel).unwrap();
        let both = blur_masked(&text_pass, &object_mask, &kernel).unwrap();
        let object_only = blur_masked(frame.image(), &object_mask, &kernel).unwrap();

        assert_eq!(out.image(), &both);
        assert_ne!(out.image(), &object_only);
    }

    #[test]
    fn debug_mode_still_blurs_text() {
        let frame = textured_frame(320, 240);
        let text = BoundingBox::new(150, 150, 40, 20);
        let result = DetectionResult {
            text_regions: vec![text],
            objects: vec![person(10, 10, 100, 150), person(200, 20, 60, 60)],
            ..DetectionResult::default()
        };
        let config = RedactConfig {
            debug_mode: true,
            ..RedactConfig::default()
        };
        let out = compositor(config).composite(&frame, Some(&result));

        assert!(mse(out.image(), frame.image(), &text) > 0.0);
        assert_eq!(*out.image().get_pixel(200, 20), ObjectRole::SameLabel.color());
        assert_eq!(out.image().get_pixel(230, 50), frame.image().get_pixel(230, 50));
    }
}
