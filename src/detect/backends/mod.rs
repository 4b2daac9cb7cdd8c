pub mod edge;
pub mod none;

pub use edge::EdgeTextDetector;
pub use none::{NoObjects, NoText};
