use anyhow::Result;
use image::RgbImage;

use crate::detect::result::{BoundingBox, ObjectDetection};

/// Detection capabilities a strategy can provide.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionCapability {
    Text,
    Object,
}

/// Text detector capability.
///
/// # Contract
///
/// Implementations are pure functions of the image:
/// - No retained pixels after `detect` returns
/// - No writes to disk, no network requests
/// - Boxes bounded by the image dimensions
///
/// `detect` takes `&self` because one instance may be shared read-only by
/// several tracks; implementations must tolerate concurrent calls.
pub trait TextDetector: Send + Sync {
    /// Strategy identifier used by the registry.
    fn name(&self) -> &'static str;

    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>>;

    /// Runs before each detection worker starts, so it may be called
    /// more than once on a shared instance.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Object detector capability. Same purity and sharing rules as [`TextDetector`].
pub trait ObjectDetector: Send + Sync {
    /// Strategy identifier used by the registry.
    fn name(&self) -> &'static str;

    fn detect(&self, image: &RgbImage) -> Result<Vec<ObjectDetection>>;

    /// Runs before each detection worker starts, so it may be called
    /// more than once on a shared instance.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
