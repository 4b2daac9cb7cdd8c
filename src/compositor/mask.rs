use crate::detect::BoundingBox;

/// Binary per-pixel selection over a frame.
#[derive(Clone, Debug)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
    bounds: Option<BoundingBox>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
            bounds: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Mark a filled rectangle. Parts outside the mask are ignored.
    pub fn fill(&mut self, rect: &BoundingBox) {
        let Some(rect) = rect.clipped(self.width, self.height) else {
            return;
        };
        let row_len = self.width as usize;
        for y in rect.y..rect.bottom() {
            let start = y as usize * row_len + rect.x as usize;
            self.bits[start..start + rect.width as usize].fill(true);
        }
        self.bounds = Some(match self.bounds {
            Some(bounds) => bounds.union(&rect),
            None => rect,
        });
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width
            && y < self.height
            && self.bits[y as usize * self.width as usize + x as usize]
    }

    /// True when no pixel is marked.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// Bounding box of every marked pixel.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_clips_and_tracks_bounds() {
        let mut mask = Mask::new(10, 10);
        assert!(mask.is_empty());
        mask.fill(&BoundingBox::new(-2, -2, 4, 4));
        mask.fill(&BoundingBox::new(8, 8, 5, 5));
        let marked = (0..10)
            .flat_map(|y| (0..10).map(move |x| (x, y)))
            .filter(|&(x, y)| mask.get(x, y))
            .count();
        assert_eq!(marked, 4 + 4);
        assert!(mask.get(0, 0));
        assert!(mask.get(9, 9));
        assert!(!mask.get(5, 5));
        assert_eq!(mask.bounds(), Some(BoundingBox::new(0, 0, 10, 10)));
    }

    #[test]
    fn fill_outside_is_ignored() {
        let mut mask = Mask::new(10, 10);
        mask.fill(&BoundingBox::new(20, 20, 5, 5));
        assert!(mask.is_empty());
    }

    #[test]
    fn get_indexes_wide_rows_and_rejects_far_coordinates() {
        let mut mask = Mask::new(70_000, 2);
        mask.fill(&BoundingBox::new(69_999, 1, 1, 1));
        assert!(mask.get(69_999, 1));
        assert!(!mask.get(69_999, 0));
        assert!(!mask.get(u32::MAX, 1));
        assert!(!mask.get(0, u32::MAX));
    }
}
