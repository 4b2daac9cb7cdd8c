//! Detection capabilities and strategy selection.
//!
//! Detection models are external collaborators: the pipeline only sees the
//! [`TextDetector`] and [`ObjectDetector`] traits. Strategies are picked once
//! per track through [`DetectorRegistry`].

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, ObjectDetector, TextDetector};
pub use backends::{EdgeTextDetector, NoObjects, NoText};
pub use registry::{DetectorRegistry, DetectorSet};
pub use result::{BoundingBox, DetectionResult, ObjectDetection, TextRegion};
