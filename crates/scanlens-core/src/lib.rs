//! scanlens-core — Perception engine for image recognition.
//!
//! Wraps three ONNX Runtime backends behind typed APIs: a generic object
//! classifier, a 468-point face-landmark estimator feeding a heuristic
//! emotion read, and a multi-person pose estimator. All inference runs on
//! CPU or whatever execution providers the caller configured on the
//! session; this crate never touches the network.

pub mod classifier;
pub mod emotion;
pub mod facemesh;
pub mod pose;
pub mod types;
pub mod vocab;

pub use classifier::{ClassifierSpec, Normalization, ObjectClassifier, Vocabulary};
pub use emotion::EMOTION_LABELS;
pub use facemesh::FaceMesher;
pub use pose::PoseEstimator;
pub use types::{Detection, EmotionReading, FaceGeometry, Keypoint, Pose};
