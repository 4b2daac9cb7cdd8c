//! Background detection worker.
//!
//! The frame path hands images to the worker through a bounded submission
//! queue and picks results up from a bounded result queue. Both hand-offs are
//! `try_send`: when a queue is full the new item is dropped and whatever is
//! already queued stays put. Nothing on the frame path ever waits on the worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbImage;
use serde::Serialize;

use crate::config::RedactConfig;
use crate::detect::{DetectionResult, DetectorSet, TextRegion};

/// Frames waiting for the worker.
pub const SUBMISSION_QUEUE_CAPACITY: usize = 2;
/// Results waiting for the frame path.
pub const RESULT_QUEUE_CAPACITY: usize = 2;

enum Job {
    Detect { frame_count: u64, image: RgbImage },
    Shutdown,
}

/// Counters shared between the frame path and the worker.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    submitted: AtomicU64,
    submissions_dropped: AtomicU64,
    results_published: AtomicU64,
    results_dropped: AtomicU64,
    detector_failures: AtomicU64,
    text_storms: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub submitted: u64,
    pub submissions_dropped: u64,
    pub results_published: u64,
    pub results_dropped: u64,
    pub detector_failures: u64,
    pub text_storms: u64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            submissions_dropped: self.submissions_dropped.load(Ordering::Relaxed),
            results_published: self.results_published.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            text_storms: self.text_storms.load(Ordering::Relaxed),
        }
    }
}

struct WorkerContext {
    jobs: Receiver<Job>,
    results: Sender<DetectionResult>,
    detectors: DetectorSet,
    active: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
    poll_timeout: Duration,
    max_text_regions: usize,
    /// Last text regions that were not a storm; republished in place of one.
    last_text: Vec<TextRegion>,
}

/// Owns one detection worker thread and its two queues.
pub struct DetectionScheduler {
    jobs: Sender<Job>,
    results: Receiver<DetectionResult>,
    active: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionScheduler {
    /// Warm the detectors up and start the worker.
    pub fn spawn(detectors: DetectorSet, config: &RedactConfig) -> Result<Self> {
        detectors.warm_up()?;
        let (jobs_tx, jobs_rx) = bounded(SUBMISSION_QUEUE_CAPACITY);
        let (results_tx, results_rx) = bounded(RESULT_QUEUE_CAPACITY);
        let active = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(SchedulerStats::default());

        let ctx = WorkerContext {
            jobs: jobs_rx,
            results: results_tx,
            detectors,
            active: active.clone(),
            stats: stats.clone(),
            poll_timeout: config.poll_timeout,
            max_text_regions: config.max_text_regions,
            last_text: Vec::new(),
        };
        let join = std::thread::Builder::new()
            .name("redact-detect".to_string())
            .spawn(move || run_worker(ctx))
            .map_err(|e| anyhow!("failed to spawn detection worker: {}", e))?;

        Ok(Self {
            jobs: jobs_tx,
            results: results_rx,
            active,
            stats,
            join: Mutex::new(Some(join)),
        })
    }

    /// Offer an image for detection without blocking.
    ///
    /// Returns false when the worker is stopped or the submission queue is
    /// full. A full queue keeps its older entries; `image` is dropped.
    pub fn submit(&self, frame_count: u64, image: RgbImage) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        match self.jobs.try_send(Job::Detect { frame_count, image }) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats
                    .submissions_dropped
                    .fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Results completed since the last call, oldest first. Never blocks.
    pub fn drain_results(&self) -> impl Iterator<Item = DetectionResult> + '_ {
        self.results.try_iter()
    }

    /// Signal the worker to exit. Safe to call any number of times.
    ///
    /// The shutdown job is best-effort; if the queue is full the cleared
    /// active flag still stops the worker at its next poll.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            let _ = self.jobs.try_send(Job::Shutdown);
            log::debug!("detection worker stop requested");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// True while the worker thread has not exited.
    pub fn is_running(&self) -> bool {
        match self.join.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|join| !join.is_finished()),
            Err(_) => false,
        }
    }

    /// Wait up to `timeout` for the worker to exit, joining it when it does.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() {
                if let Ok(mut guard) = self.join.lock() {
                    if let Some(join) = guard.take() {
                        if join.join().is_err() {
                            log::error!("detection worker panicked");
                        }
                    }
                }
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn stats(&self) -> SchedulerSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for DetectionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(mut ctx: WorkerContext) {
    log::debug!(
        "detection worker started (text={}, object={:?})",
        ctx.detectors.text.name(),
        ctx.detectors.object.as_ref().map(|o| o.name())
    );

    while ctx.active.load(Ordering::Acquire) {
        let (frame_count, image) = match ctx.jobs.recv_timeout(ctx.poll_timeout) {
            Ok(Job::Detect { frame_count, image }) => (frame_count, image),
            Ok(Job::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if !ctx.active.load(Ordering::Acquire) {
            break;
        }

        let result = detect_frame(&mut ctx, frame_count, &image);
        match ctx.results.try_send(result) {
            Ok(()) => {
                ctx.stats.results_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                ctx.stats.results_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    log::debug!("detection worker stopped");
}

fn detect_frame(ctx: &mut WorkerContext, frame_count: u64, image: &RgbImage) -> DetectionResult {
    let mut result = DetectionResult {
        frame_count,
        ..DetectionResult::default()
    };

    let text = ctx.detectors.text.as_ref();
    match guarded(|| text.detect(image)) {
        Ok(regions) if regions.len() > ctx.max_text_regions => {
            ctx.stats.text_storms.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "text detector {} reported {} regions on frame {}; discarding as false positives",
                text.name(),
                regions.len(),
                frame_count
            );
            result.text_regions = ctx.last_text.clone();
        }
        Ok(regions) => {
            ctx.last_text = regions.clone();
            result.text_regions = regions;
        }
        Err(e) => {
            ctx.stats.detector_failures.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "text detector {} failed on frame {}: {:#}",
                text.name(),
                frame_count,
                e
            );
        }
    }

    if let Some(object) = ctx.detectors.object.as_deref() {
        match guarded(|| object.detect(image)) {
            Ok(objects) => result.objects = objects,
            Err(e) => {
                ctx.stats.detector_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "object detector {} failed on frame {}: {:#}",
                    object.name(),
                    frame_count,
                    e
                );
            }
        }
    }

    result
}

/// Run a detector call, turning a panic into an error.
fn guarded<T>(call: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow!("detector panicked: {}", message))
        }
    }
}
