pub mod download;
pub mod locator;
pub mod onnx;

pub use locator::{is_geographic, location_candidates, Entity, EntityLocator};
pub use onnx::OnnxEntityLocator;
