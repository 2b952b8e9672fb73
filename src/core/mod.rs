pub mod attributes;
pub mod detector;
pub mod engine;
pub mod liveness;
pub mod recognizer;

pub use attributes::{AttributeAction, AttributeAnalyzer, AttributeReport, ALL_ACTIONS};
pub use detector::{FaceBox, FaceDetector};
pub use engine::{
    DbMatch, ExtractOptions, FaceEngine, FaceObject, FacialArea, OnnxEngine, Verification,
};
pub use liveness::{LivenessClassifier, LivenessScore};
pub use recognizer::{cosine_similarity, Embedding, FaceRecognizer};
