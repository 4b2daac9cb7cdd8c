use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

/// Pixel layouts a transport may hand over after decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    #[default]
    Rgb24,
    /// Packed blue-green-red, the layout most software decoders emit.
    Bgr24,
    /// Full-resolution luma plane followed by interleaved half-resolution chroma.
    Nv12,
}

impl PixelFormat {
    /// Bytes a `width x height` picture occupies in this layout.
    pub fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("{}x{} frame dimensions overflow", width, height))?;
        let len = match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        };
        len.ok_or_else(|| anyhow!("{}x{} frame dimensions overflow", width, height))
    }
}

/// Convert a decoded picture into an RGB24 image.
pub fn to_rgb_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage> {
    if format == PixelFormat::Nv12 && (width % 2 != 0 || height % 2 != 0) {
        return Err(anyhow!(
            "NV12 frames need even dimensions, got {}x{}",
            width,
            height
        ));
    }
    let expected = format.frame_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{:?} frame length mismatch for {}x{}: expected {}, got {}",
            format,
            width,
            height,
            expected,
            pixels.len()
        ));
    }

    let image = match format {
        PixelFormat::Rgb24 => RgbImage::from_raw(width, height, pixels.to_vec()),
        PixelFormat::Bgr24 => {
            let swapped = pixels
                .chunks_exact(3)
                .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
                .collect();
            RgbImage::from_raw(width, height, swapped)
        }
        PixelFormat::Nv12 => Some(nv12_image(pixels, width, height)),
    };
    image.ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))
}

/// BT.601 full-range conversion; one chroma pair covers a 2x2 luma block.
fn nv12_image(pixels: &[u8], width: u32, height: u32) -> RgbImage {
    let stride = width as usize;
    let (luma, chroma) = pixels.split_at(stride * height as usize);
    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let pair = (y / 2) * stride + (x / 2) * 2;
        let l = luma[y * stride + x] as f32;
        let u = chroma[pair] as f32 - 128.0;
        let v = chroma[pair + 1] as f32 - 128.0;
        Rgb([
            to_channel(l + 1.402 * v),
            to_channel(l - 0.344_136 * u - 0.714_136 * v),
            to_channel(l + 1.772 * u),
        ])
    })
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
