//! Frame sources feeding track adapters.
//!
//! Sources produce [`crate::Frame`] values in RGB24. Transport adapters that
//! decode into other layouts feed a [`RawChannelSource`], which converts
//! with [`to_rgb_image`].
//!
//! Sources MUST NOT:
//! - Store decoded frames to disk
//! - Log raw frame content

mod channel;
mod normalize;
pub mod synthetic;

pub use channel::{ChannelSource, RawChannelSource, RawVideoFrame};
pub use normalize::{to_rgb_image, PixelFormat};
pub use synthetic::{SyntheticConfig, SyntheticSource};
