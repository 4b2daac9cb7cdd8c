//! Per-track frame flow.
//!
//! [`TrackAdapter::recv`] is called once per outgoing frame tick. It waits for
//! the next upstream frame, occasionally hands a copy to the detection worker,
//! picks up the newest finished result and composites the output. Only the
//! upstream wait may suspend; everything after it runs in bounded time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cache::DetectionCache;
use crate::compositor::BlurCompositor;
use crate::config::RedactConfig;
use crate::detect::DetectorSet;
use crate::frame::Frame;
use crate::scheduler::{DetectionScheduler, SchedulerSnapshot};

/// Upstream producer of decoded frames for one track.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. An error means the track has no more frames.
    async fn recv(&mut self) -> Result<Frame>;
}

/// True when frame number `frame_count` is due for detection.
pub fn should_submit(frame_count: u64, detection_interval: u64) -> bool {
    frame_count % detection_interval.max(1) == 0
}

/// Cheap, cloneable handle that stops a track's detection worker.
#[derive(Clone)]
pub struct CleanupHandle {
    scheduler: Arc<DetectionScheduler>,
}

impl CleanupHandle {
    /// Stop the worker. Idempotent and never fails.
    pub fn cleanup(&self) {
        self.scheduler.stop();
    }

    pub fn is_active(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Wait for the worker thread to exit.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.scheduler.wait_stopped(timeout)
    }
}

/// Redacting wrapper around an inbound video track.
pub struct TrackAdapter {
    source: Box<dyn FrameSource>,
    scheduler: Arc<DetectionScheduler>,
    cache: DetectionCache,
    compositor: Arc<BlurCompositor>,
    detection_interval: u64,
    frame_count: u64,
}

impl TrackAdapter {
    /// Wrap `source`, starting a dedicated detection worker for it.
    pub fn new(
        source: Box<dyn FrameSource>,
        detectors: DetectorSet,
        compositor: Arc<BlurCompositor>,
        config: &RedactConfig,
    ) -> Result<Self> {
        let scheduler = DetectionScheduler::spawn(detectors, config)?;
        Ok(Self {
            source,
            scheduler: Arc::new(scheduler),
            cache: DetectionCache::new(),
            compositor,
            detection_interval: config.detection_interval.max(1),
            frame_count: 0,
        })
    }

    /// Next outgoing frame.
    ///
    /// Fails only when the upstream source fails; every other problem falls
    /// back to emitting the input frame unchanged.
    pub async fn recv(&mut self) -> Result<Frame> {
        let frame = self.source.recv().await?;
        Ok(self.process(frame))
    }

    /// Run one frame through submit, drain and composite.
    pub fn process(&mut self, frame: Frame) -> Frame {
        match catch_unwind(AssertUnwindSafe(|| self.redact(&frame))) {
            Ok(out) => out,
            Err(_) => {
                log::error!(
                    "frame path panicked at frame {}, passing frame through",
                    self.frame_count
                );
                frame
            }
        }
    }

    fn redact(&mut self, frame: &Frame) -> Frame {
        self.frame_count += 1;
        if should_submit(self.frame_count, self.detection_interval) {
            let _ = self
                .scheduler
                .submit(self.frame_count, frame.image().clone());
        }
        let cached = self.cache.drain_latest(self.scheduler.drain_results());
        self.compositor.composite(frame, cached)
    }

    /// Stop the detection worker. Safe to call more than once.
    pub fn cleanup(&self) {
        self.scheduler.stop();
    }

    pub fn cleanup_handle(&self) -> CleanupHandle {
        CleanupHandle {
            scheduler: self.scheduler.clone(),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    pub fn stats(&self) -> SchedulerSnapshot {
        self.scheduler.stats()
    }

    /// Forward frames into `sink` until the upstream ends or the sink closes.
    /// Returns the number of frames delivered.
    pub async fn pump(mut self, sink: mpsc::Sender<Frame>) -> u64 {
        let mut delivered = 0u64;
        loop {
            let frame = match self.recv().await {
                Ok(frame) => frame,
                Err(e) => {
                    log::info!("track upstream ended after {} frames: {:#}", delivered, e);
                    break;
                }
            };
            if sink.send(frame).await.is_err() {
                log::info!("track sink closed after {} frames", delivered);
                break;
            }
            delivered += 1;
        }
        self.cleanup();
        delivered
    }
}

impl Drop for TrackAdapter {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submits_on_interval_multiples_only() {
        for interval in 1..=7u64 {
            for n in 1..=50u64 {
                assert_eq!(should_submit(n, interval), n % interval == 0);
            }
        }
        assert!(should_submit(3, 0));
    }
}
