use crate::detect::DetectionResult;

/// Latest completed detection result for one track.
///
/// Owned by the frame path. Results are replaced whole; a newer result always
/// wins over an older one, even if the older one was never used.
#[derive(Debug, Default)]
pub struct DetectionCache {
    latest: Option<DetectionResult>,
    /// Whether `latest` has been handed to a frame.
    used: bool,
    superseded: u64,
}

impl DetectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume every pending result, keeping only the last one seen.
    ///
    /// Returns the cached result, which is the previous one when nothing new
    /// arrived.
    pub fn drain_latest<I>(&mut self, incoming: I) -> Option<&DetectionResult>
    where
        I: IntoIterator<Item = DetectionResult>,
    {
        for result in incoming {
            if self.latest.replace(result).is_some() && !self.used {
                self.superseded += 1;
            }
            self.used = false;
        }
        if self.latest.is_some() {
            self.used = true;
        }
        self.latest.as_ref()
    }

    pub fn latest(&self) -> Option<&DetectionResult> {
        self.latest.as_ref()
    }

    /// Frames elapsed since the cached result's frame.
    pub fn staleness(&self, frame_count: u64) -> Option<u64> {
        self.latest
            .as_ref()
            .map(|result| frame_count.saturating_sub(result.frame_count))
    }

    /// Results replaced by a newer one before any frame used them.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}
