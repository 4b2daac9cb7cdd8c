//! Stream Redact
//!
//! Privacy redaction for live video tracks. Each inbound video track is
//! wrapped so that every outgoing frame has text regions and sensitive
//! objects blurred, while the main subject stays visible.
//!
//! # Architecture
//!
//! Detection is slower than the frame rate, so it runs off the frame path:
//!
//! 1. The frame path submits every Nth frame to a per-track detection worker
//!    without blocking, dropping the frame when the worker is behind.
//! 2. The worker publishes results to a bounded queue.
//! 3. The frame path drains that queue, keeps only the newest result and
//!    composites every frame with it, even when it is a few frames old.
//!
//! A redacted frame is always emitted with the input's timing, whatever the
//! detectors do.
//!
//! # Module Structure
//!
//! - `frame`: Frame and time base types
//! - `detect`: Detector traits, strategy registry, built-in detectors
//! - `scheduler`: Per-track detection worker and its queues
//! - `cache`: Newest-result cache on the frame path
//! - `compositor`: Blur masks and the debug overlay
//! - `track`: The redacting track adapter
//! - `session`: Connection lifecycle and track cleanup
//! - `ingest`: Frame sources and pixel format conversion

pub mod cache;
pub mod compositor;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod scheduler;
pub mod session;
pub mod track;

pub use cache::DetectionCache;
pub use compositor::{BlurCompositor, ObjectRole, ObjectRules};
pub use config::{IdCardHeuristic, RedactConfig};
pub use detect::{
    BoundingBox, DetectionCapability, DetectionResult, DetectorRegistry, DetectorSet,
    ObjectDetection, ObjectDetector, TextDetector, TextRegion,
};
pub use frame::{Frame, TimeBase};
pub use ingest::{
    ChannelSource, PixelFormat, RawChannelSource, RawVideoFrame, SyntheticConfig, SyntheticSource,
};
pub use scheduler::{DetectionScheduler, SchedulerSnapshot};
pub use session::{
    ConnectionState, InboundTrack, OutboundTrack, Session, SessionEvent, SessionSummary,
    TrackRegistry,
};
pub use track::{CleanupHandle, FrameSource, TrackAdapter};
