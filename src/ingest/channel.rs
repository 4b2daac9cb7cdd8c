use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::frame::{Frame, TimeBase};
use crate::track::FrameSource;

use super::normalize::{to_rgb_image, PixelFormat};

/// Frame source fed through a tokio channel by a transport adapter.
pub struct ChannelSource {
    rx: mpsc::Receiver<Frame>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Frame>) -> Self {
        Self { rx }
    }

    /// Source plus the sender that feeds it.
    pub fn pair(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Frame> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("upstream track closed"))
    }
}

/// Decoded picture as the transport's decoder produced it.
#[derive(Clone, Debug)]
pub struct RawVideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub pts: i64,
    pub time_base: TimeBase,
}

/// Channel source for transports that decode into a non-RGB layout.
///
/// Every picture is converted to RGB24 on receipt. A picture that does not
/// match its declared size is an upstream failure.
pub struct RawChannelSource {
    rx: mpsc::Receiver<RawVideoFrame>,
    format: PixelFormat,
}

impl RawChannelSource {
    pub fn pair(capacity: usize, format: PixelFormat) -> (mpsc::Sender<RawVideoFrame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, format })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

#[async_trait]
impl FrameSource for RawChannelSource {
    async fn recv(&mut self) -> Result<Frame> {
        let raw = self
            .rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("upstream track closed"))?;
        let image = to_rgb_image(&raw.data, raw.width, raw.height, self.format)
            .with_context(|| format!("undecodable frame at pts {}", raw.pts))?;
        Ok(Frame::new(image, raw.pts, raw.time_base))
    }
}
