use serde::{Deserialize, Serialize};

/// A single classification result: label plus confidence in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Sort detections by descending confidence, in place.
pub fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Keep the `k` highest-confidence detections, sorted descending.
pub fn top_k(mut detections: Vec<Detection>, k: usize) -> Vec<Detection> {
    sort_by_confidence(&mut detections);
    detections.truncate(k);
    detections
}

/// Face landmarks in image coordinates, with the model's face-presence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceGeometry {
    /// 468 mesh points as (x, y, z); z is relative depth in pixel units.
    pub landmarks: Vec<(f32, f32, f32)>,
    /// Face-presence confidence in [0, 1].
    pub presence: f32,
}

/// A coarse emotion read derived from face landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionReading {
    pub emotion: String,
    /// Pseudo-probability in [0, 1]. Heuristic, not a calibrated score.
    pub confidence: f32,
}

/// A named body keypoint with its position in image coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keypoint {
    pub part: String,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// One detected person: 17 keypoints plus an overall instance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
    pub score: f32,
}
