//! Synthetic frame source for demos and tests.
//!
//! Paints a slowly scrolling background, a tall "person" block and a striped
//! card that drifts across the frame. The card's stripes are dense enough to
//! trip the edge text heuristic.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use rand::Rng;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::detect::BoundingBox;
use crate::frame::{Frame, TimeBase};
use crate::track::FrameSource;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Frames per second. Also sets the pts step.
    pub target_fps: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Amplitude of per-pixel noise, 0 disables it.
    pub noise: u8,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 30,
            max_frames: None,
            noise: 4,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyntheticStats {
    pub frames_generated: u64,
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    ticker: Interval,
    frame_count: u64,
}

impl SyntheticSource {
    /// Must be called inside a tokio runtime.
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.target_fps == 0 {
            return Err(anyhow!("synthetic source fps must be >= 1"));
        }
        if config.width < 32 || config.height < 32 {
            return Err(anyhow!(
                "synthetic frames must be at least 32x32, got {}x{}",
                config.width,
                config.height
            ));
        }
        let mut ticker = interval(Duration::from_secs_f64(1.0 / config.target_fps as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "synthetic source: {}x{} @ {} fps",
            config.width,
            config.height,
            config.target_fps
        );
        Ok(Self {
            config,
            ticker,
            frame_count: 0,
        })
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            frames_generated: self.frame_count,
        }
    }

    /// Where the striped card sits in frame `n`.
    pub fn card_at(&self, n: u64) -> BoundingBox {
        let (w, h) = (self.config.width as i32, self.config.height as i32);
        let card_w = (w / 4).max(16);
        let card_h = (h / 8).max(8);
        let travel = (w - card_w).max(1) as u64;
        let x = (n * 2 % (2 * travel)) as i32;
        let x = if x as u64 > travel {
            2 * travel as i32 - x
        } else {
            x
        };
        BoundingBox::new(x, h - card_h - h / 10, card_w, card_h)
    }

    /// Where the person block sits; static.
    pub fn person_at(&self) -> BoundingBox {
        let (w, h) = (self.config.width as i32, self.config.height as i32);
        BoundingBox::new(w / 2 - w / 10, h / 8, w / 5, h * 5 / 8)
    }

    fn paint(&self, n: u64) -> RgbImage {
        let card = self.card_at(n);
        let person = self.person_at();
        let noise = self.config.noise;
        let mut rng = rand::thread_rng();
        RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            let (xi, yi) = (x as i32, y as i32);
            let in_box =
                |b: &BoundingBox| xi >= b.x && xi < b.right() && yi >= b.y && yi < b.bottom();
            let base = if in_box(&card) {
                if ((x - card.x as u32) / 2) % 2 == 0 {
                    [20, 20, 20]
                } else {
                    [235, 235, 235]
                }
            } else if in_box(&person) {
                [180, 120, 90]
            } else {
                let shade = ((x as u64 + y as u64 + n) / 8 % 64) as u8;
                [60 + shade, 80 + shade / 2, 110]
            };
            if noise == 0 {
                return Rgb(base);
            }
            let jitter = rng.gen_range(0..=noise);
            Rgb(base.map(|c| c.saturating_add(jitter)))
        })
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn recv(&mut self) -> Result<Frame> {
        if let Some(max) = self.config.max_frames {
            if self.frame_count >= max {
                return Err(anyhow!("synthetic source exhausted after {} frames", max));
            }
        }
        self.ticker.tick().await;
        let n = self.frame_count;
        self.frame_count += 1;
        let step = (TimeBase::VIDEO_90K.den / self.config.target_fps as i32) as i64;
        Ok(Frame::new(self.paint(n), n as i64 * step, TimeBase::VIDEO_90K))
    }
}
