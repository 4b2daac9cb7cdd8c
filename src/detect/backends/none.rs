use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::{ObjectDetector, TextDetector};
use crate::detect::result::{BoundingBox, ObjectDetection};

/// Text strategy that never reports anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoText;

impl TextDetector for NoText {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>> {
        Ok(Vec::new())
    }
}

/// Object strategy that never reports anything.
///
/// Default when no model-backed object detector is registered.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoObjects;

impl ObjectDetector for NoObjects {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<ObjectDetection>> {
        Ok(Vec::new())
    }
}
