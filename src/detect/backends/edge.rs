use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::TextDetector;
use crate::detect::result::BoundingBox;

const DEFAULT_CELL: u32 = 16;
const DEFAULT_EDGE_THRESHOLD: i32 = 40;
const DEFAULT_MIN_DENSITY: f32 = 0.15;
const DEFAULT_MIN_RUN: u32 = 2;

/// CPU text heuristic based on horizontal-gradient density.
///
/// Printed text produces many sharp luminance transitions along a row. The
/// frame is split into square cells; a cell is "texty" when the share of
/// strong horizontal gradients reaches `min_density`. Horizontal runs of
/// texty cells become boxes, and runs touching a box from the row above are
/// folded into it.
#[derive(Clone, Debug)]
pub struct EdgeTextDetector {
    cell: u32,
    edge_threshold: i32,
    min_density: f32,
    min_run: u32,
}

impl Default for EdgeTextDetector {
    fn default() -> Self {
        Self {
            cell: DEFAULT_CELL,
            edge_threshold: DEFAULT_EDGE_THRESHOLD,
            min_density: DEFAULT_MIN_DENSITY,
            min_run: DEFAULT_MIN_RUN,
        }
    }
}

impl EdgeTextDetector {
    fn texty_cells(&self, image: &RgbImage) -> (Vec<bool>, u32, u32) {
        let (width, height) = image.dimensions();
        let cols = width.div_ceil(self.cell);
        let rows = height.div_ceil(self.cell);
        let mut counts = vec![0u32; (cols * rows) as usize];

        let luma: Vec<i32> = image
            .pixels()
            .map(|p| (p[0] as i32 * 299 + p[1] as i32 * 587 + p[2] as i32 * 114) / 1000)
            .collect();

        for y in 0..height {
            let row = (y * width) as usize;
            let cy = y / self.cell;
            for x in 0..width.saturating_sub(1) {
                let idx = row + x as usize;
                if (luma[idx + 1] - luma[idx]).abs() > self.edge_threshold {
                    counts[(cy * cols + x / self.cell) as usize] += 1;
                }
            }
        }

        let mut texty = vec![false; counts.len()];
        for cy in 0..rows {
            for cx in 0..cols {
                let cell_w = self.cell.min(width - cx * self.cell);
                let cell_h = self.cell.min(height - cy * self.cell);
                let idx = (cy * cols + cx) as usize;
                let density = counts[idx] as f32 / (cell_w * cell_h) as f32;
                texty[idx] = density >= self.min_density;
            }
        }
        (texty, cols, rows)
    }
}

impl TextDetector for EdgeTextDetector {
    fn name(&self) -> &'static str {
        "edge"
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let (texty, cols, rows) = self.texty_cells(image);
        let cell = self.cell as i32;

        let mut boxes: Vec<BoundingBox> = Vec::new();
        for cy in 0..rows {
            let mut cx = 0;
            while cx < cols {
                if !texty[(cy * cols + cx) as usize] {
                    cx += 1;
                    continue;
                }
                let start = cx;
                while cx < cols && texty[(cy * cols + cx) as usize] {
                    cx += 1;
                }
                if cx - start < self.min_run {
                    continue;
                }
                let run = BoundingBox::new(
                    start as i32 * cell,
                    cy as i32 * cell,
                    (cx - start) as i32 * cell,
                    cell,
                );
                match boxes.iter_mut().find(|b| {
                    b.bottom() == run.y && b.x < run.right() && run.x < b.right()
                }) {
                    Some(existing) => *existing = existing.union(&run),
                    None => boxes.push(run),
                }
            }
        }

        Ok(boxes
            .into_iter()
            .filter_map(|b| b.clipped(width, height))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn striped_card(width: u32, height: u32, card: BoundingBox) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let inside = (x as i32) >= card.x
                && (x as i32) < card.right()
                && (y as i32) >= card.y
                && (y as i32) < card.bottom();
            if inside {
                if (x / 2) % 2 == 0 {
                    Rgb([0, 0, 0])
                } else {
                    Rgb([255, 255, 255])
                }
            } else {
                Rgb([128, 128, 128])
            }
        })
    }

    #[test]
    fn flat_image_has_no_text() {
        let image = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
        let boxes = EdgeTextDetector::default().detect(&image).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn striped_block_is_reported_as_one_box() {
        let card = BoundingBox::new(96, 192, 160, 32);
        let image = striped_card(320, 256, card);
        let boxes = EdgeTextDetector::default().detect(&image).unwrap();
        assert_eq!(boxes, vec![card]);
    }

    #[test]
    fn isolated_cell_is_ignored() {
        let card = BoundingBox::new(32, 32, 16, 16);
        let image = striped_card(128, 128, card);
        let boxes = EdgeTextDetector::default().detect(&image).unwrap();
        assert!(boxes.is_empty());
    }
}
