pub mod classifier;
pub mod onnx;

pub use classifier::RelevanceClassifier;
pub use onnx::OnnxRelevanceClassifier;
