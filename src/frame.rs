//! Video frames as they move through a track.
//!
//! A [`Frame`] is an RGB24 image plus its presentation timestamp and time
//! base. Pixels are read-only once a frame exists: every stage that changes
//! pixels produces a new frame carrying the same timing.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Rational time base, `num / den` seconds per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    /// RTP video clock.
    pub const VIDEO_90K: TimeBase = TimeBase { num: 1, den: 90_000 };

    pub fn new(num: i32, den: i32) -> Result<Self> {
        if num <= 0 || den <= 0 {
            return Err(anyhow!("time base must be positive, got {}/{}", num, den));
        }
        Ok(Self { num, den })
    }

    /// Seconds represented by `pts` ticks.
    pub fn seconds(&self, pts: i64) -> f64 {
        pts as f64 * self.num as f64 / self.den as f64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::VIDEO_90K
    }
}

/// One decoded video frame: `width x height x 3` bytes, one byte per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
    pub pts: i64,
    pub time_base: TimeBase,
}

impl Frame {
    pub fn new(image: RgbImage, pts: i64, time_base: TimeBase) -> Self {
        Self {
            image,
            pts,
            time_base,
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_raw(
        width: u32,
        height: u32,
        data: Vec<u8>,
        pts: i64,
        time_base: TimeBase,
    ) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image, pts, time_base))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// New frame with different pixels and this frame's timing.
    pub fn with_image(&self, image: RgbImage) -> Frame {
        Frame {
            image,
            pts: self.pts,
            time_base: self.time_base,
        }
    }

    /// Presentation time in seconds.
    pub fn seconds(&self) -> f64 {
        self.time_base.seconds(self.pts)
    }
}
