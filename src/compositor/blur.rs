//! Gaussian blur restricted to a mask.
//!
//! `imageproc::filter::gaussian_blur_f32` derives the kernel width from sigma;
//! here the configured kernel size is fixed and sigma follows from it.

use anyhow::{anyhow, Result};
use image::RgbImage;

use super::mask::Mask;

/// Normalised 1-D Gaussian weights for an odd kernel size.
///
/// Sigma follows the usual derivation from the kernel size:
/// `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(ksize: u32) -> Result<Vec<f32>> {
    if ksize == 0 || ksize % 2 == 0 {
        return Err(anyhow!("gaussian kernel size must be odd, got {}", ksize));
    }
    if ksize == 1 {
        return Ok(vec![1.0]);
    }
    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (ksize / 2) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

/// Mirror an out-of-range index back into `0..len`, not repeating the edge pixel.
fn reflect(mut i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * len - 2 - i;
        }
    }
    i
}

/// Copy of `src` where every pixel marked in `mask` is replaced by the
/// Gaussian-blurred value of `src` at that pixel.
///
/// Equivalent to blurring the whole image and selecting through the mask,
/// but only the mask's bounding box (plus the kernel radius) is computed.
pub fn blur_masked(src: &RgbImage, mask: &Mask, kernel: &[f32]) -> Result<RgbImage> {
    let (width, height) = src.dimensions();
    if mask.width() != width || mask.height() != height {
        return Err(anyhow!(
            "mask {}x{} does not match image {}x{}",
            mask.width(),
            mask.height(),
            width,
            height
        ));
    }
    let mut out = src.clone();
    let Some(roi) = mask.bounds() else {
        return Ok(out);
    };
    if kernel.len() <= 1 {
        return Ok(out);
    }

    let radius = (kernel.len() / 2) as i64;
    let (w, h) = (width as i64, height as i64);
    let pixels = src.as_raw();

    // Horizontal pass over every row the vertical pass can reach.
    let row0 = (roi.y as i64 - radius).max(0);
    let row1 = (roi.bottom() as i64 + radius).min(h);
    let cols = roi.width as usize;
    let mut horizontal = vec![0f32; (row1 - row0) as usize * cols * 3];
    for y in row0..row1 {
        let src_row = (y * w * 3) as usize;
        let dst_row = (y - row0) as usize * cols * 3;
        for (cx, x) in (roi.x as i64..roi.right() as i64).enumerate() {
            let mut acc = [0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect(x + k as i64 - radius, w) as usize;
                let idx = src_row + sx * 3;
                acc[0] += pixels[idx] as f32 * weight;
                acc[1] += pixels[idx + 1] as f32 * weight;
                acc[2] += pixels[idx + 2] as f32 * weight;
            }
            let dst = dst_row + cx * 3;
            horizontal[dst..dst + 3].copy_from_slice(&acc);
        }
    }

    // Vertical pass, written only where the mask is set.
    let dst_pixels: &mut [u8] = &mut out;
    for y in roi.y as i64..roi.bottom() as i64 {
        for (cx, x) in (roi.x as i64..roi.right() as i64).enumerate() {
            if !mask.get(x as u32, y as u32) {
                continue;
            }
            let mut acc = [0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect(y + k as i64 - radius, h).clamp(row0, row1 - 1);
                let idx = (sy - row0) as usize * cols * 3 + cx * 3;
                acc[0] += horizontal[idx] * weight;
                acc[1] += horizontal[idx + 1] * weight;
                acc[2] += horizontal[idx + 2] * weight;
            }
            let dst = ((y * w + x) * 3) as usize;
            for c in 0..3 {
                dst_pixels[dst + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use image::Rgb;

    fn checker(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 0, 255])
            } else {
                Rgb([0, 255, 0])
            }
        })
    }

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let kernel = gaussian_kernel(51).unwrap();
        assert_eq!(kernel.len(), 51);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert_eq!(kernel[0], kernel[50]);
        assert!(kernel[25] > kernel[24]);
    }

    #[test]
    fn even_kernel_is_rejected() {
        assert!(gaussian_kernel(4).is_err());
        assert!(gaussian_kernel(0).is_err());
    }

    #[test]
    fn reflect_mirrors_without_repeating_edge() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-2, 5), 2);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(-7, 3), 1);
        assert_eq!(reflect(4, 1), 0);
    }

    #[test]
    fn flat_image_is_unchanged_by_blur() {
        let src = RgbImage::from_pixel(20, 20, Rgb([10, 20, 30]));
        let mut mask = Mask::new(20, 20);
        mask.fill(&BoundingBox::new(0, 0, 20, 20));
        let out = blur_masked(&src, &mask, &gaussian_kernel(7).unwrap()).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn only_masked_pixels_change() {
        let src = checker(32, 32);
        let mut mask = Mask::new(32, 32);
        mask.fill(&BoundingBox::new(8, 8, 8, 8));
        let out = blur_masked(&src, &mask, &gaussian_kernel(5).unwrap()).unwrap();
        for (x, y, pixel) in out.enumerate_pixels() {
            if mask.get(x, y) {
                assert_ne!(pixel, src.get_pixel(x, y));
            } else {
                assert_eq!(pixel, src.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn roi_blur_matches_full_frame_blur() {
        let src = RgbImage::from_fn(24, 16, |x, y| {
            Rgb([(x * 10) as u8, (y * 15) as u8, ((x * y) % 256) as u8])
        });
        let kernel = gaussian_kernel(9).unwrap();
        let mut full = Mask::new(24, 16);
        full.fill(&BoundingBox::new(0, 0, 24, 16));
        let mut corner = Mask::new(24, 16);
        corner.fill(&BoundingBox::new(0, 0, 5, 4));

        let everywhere = blur_masked(&src, &full, &kernel).unwrap();
        let partial = blur_masked(&src, &corner, &kernel).unwrap();
        for y in 0..4 {
            for x in 0..5 {
                assert_eq!(partial.get_pixel(x, y), everywhere.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn mismatched_mask_is_an_error() {
        let src = RgbImage::new(4, 4);
        assert!(blur_masked(&src, &Mask::new(3, 4), &[1.0]).is_err());
    }
}
