//! Multi-person pose estimator via ONNX Runtime.
//!
//! Wraps a MoveNet-style multi-pose export: one 256×256 int32 RGB input and
//! a single `[1, 6, 56]` output — up to six instances, each carrying 17
//! keypoints as (y, x, score) triples followed by a bounding box and an
//! instance score, all normalized to the padded input square.

use crate::types::{Keypoint, Pose};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const POSE_INPUT_SIZE: u32 = 256;
const KEYPOINT_COUNT: usize = 17;
/// Floats per decoded instance: 17 × (y, x, score) + box (4) + score.
const INSTANCE_STRIDE: usize = KEYPOINT_COUNT * 3 + 5;
/// Instances below this score are dropped.
const POSE_SCORE_THRESHOLD: f32 = 0.3;
/// Cap on returned poses.
const MAX_POSES: usize = 5;

/// Keypoint part names, in model output order.
const PART_NAMES: [&str; KEYPOINT_COUNT] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

#[derive(Error, Debug)]
pub enum PoseError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Multi-person pose estimator.
pub struct PoseEstimator {
    session: Session,
    score_threshold: f32,
}

impl PoseEstimator {
    /// Load the pose ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, PoseError> {
        if !Path::new(model_path).exists() {
            return Err(PoseError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded pose model");

        Ok(Self {
            session,
            score_threshold: POSE_SCORE_THRESHOLD,
        })
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Estimate poses, sorted by descending instance score, at most five.
    pub fn estimate(&mut self, image: &RgbImage) -> Result<Vec<Pose>, PoseError> {
        let (input, letterbox) = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseError::InferenceFailed(format!("pose instances: {e}")))?;

        Ok(decode_poses(raw, &letterbox, self.score_threshold))
    }
}

/// Letterbox-resize into the square int32 input (no normalization), NHWC.
fn preprocess(image: &RgbImage) -> (Array4<i32>, LetterboxInfo) {
    let (width, height) = image.dimensions();
    let input = POSE_INPUT_SIZE;

    let scale_w = input as f32 / width.max(1) as f32;
    let scale_h = input as f32 / height.max(1) as f32;
    let scale = scale_w.min(scale_h);

    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (input - new_w) as f32 / 2.0;
    let pad_y = (input - new_h) as f32 / 2.0;

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = input as usize;
    let pad_x_start = pad_x.floor() as usize;
    let pad_y_start = pad_y.floor() as usize;

    let mut tensor = Array4::<i32>::zeros((1, size, size, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let ty = y as usize + pad_y_start;
        let tx = x as usize + pad_x_start;
        for c in 0..3 {
            tensor[[0, ty, tx, c]] = pixel.0[c] as i32;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Decode raw instance rows into poses in original image coordinates.
fn decode_poses(raw: &[f32], letterbox: &LetterboxInfo, score_threshold: f32) -> Vec<Pose> {
    let input = POSE_INPUT_SIZE as f32;
    let mut poses: Vec<Pose> = raw
        .chunks_exact(INSTANCE_STRIDE)
        .filter_map(|instance| {
            let score = instance[INSTANCE_STRIDE - 1];
            if score < score_threshold {
                return None;
            }
            let keypoints = (0..KEYPOINT_COUNT)
                .map(|i| {
                    // Normalized (y, x) relative to the padded input square.
                    let y = instance[i * 3] * input;
                    let x = instance[i * 3 + 1] * input;
                    Keypoint {
                        part: PART_NAMES[i].to_string(),
                        x: (x - letterbox.pad_x) / letterbox.scale,
                        y: (y - letterbox.pad_y) / letterbox.scale,
                        score: instance[i * 3 + 2],
                    }
                })
                .collect();
            Some(Pose { keypoints, score })
        })
        .collect();

    poses.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    poses.truncate(MAX_POSES);
    poses
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one raw instance row with uniform keypoints and a given score.
    fn instance(kp_y: f32, kp_x: f32, kp_score: f32, score: f32) -> Vec<f32> {
        let mut row = Vec::with_capacity(INSTANCE_STRIDE);
        for _ in 0..KEYPOINT_COUNT {
            row.extend_from_slice(&[kp_y, kp_x, kp_score]);
        }
        row.extend_from_slice(&[0.0, 0.0, 1.0, 1.0]); // box
        row.push(score);
        row
    }

    fn identity_letterbox() -> LetterboxInfo {
        LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    #[test]
    fn test_decode_filters_below_threshold() {
        let mut raw = instance(0.5, 0.5, 0.9, 0.8);
        raw.extend(instance(0.5, 0.5, 0.9, 0.1));
        let poses = decode_poses(&raw, &identity_letterbox(), POSE_SCORE_THRESHOLD);
        assert_eq!(poses.len(), 1);
        assert!((poses[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_decode_sorted_and_capped() {
        let mut raw = Vec::new();
        for score in [0.4, 0.9, 0.5, 0.7, 0.6, 0.8] {
            raw.extend(instance(0.5, 0.5, 0.9, score));
        }
        let poses = decode_poses(&raw, &identity_letterbox(), POSE_SCORE_THRESHOLD);
        assert_eq!(poses.len(), MAX_POSES);
        assert!((poses[0].score - 0.9).abs() < 1e-6);
        for pair in poses.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_decode_maps_coordinates() {
        // Keypoints at the center of the input square, 2x letterbox scale
        // with 28px horizontal padding.
        let raw = instance(0.5, 0.5, 0.9, 0.8);
        let letterbox = LetterboxInfo {
            scale: 2.0,
            pad_x: 28.0,
            pad_y: 0.0,
        };
        let poses = decode_poses(&raw, &letterbox, POSE_SCORE_THRESHOLD);
        let kp = &poses[0].keypoints[0];
        assert_eq!(kp.part, "nose");
        assert!((kp.x - (128.0 - 28.0) / 2.0).abs() < 1e-4);
        assert!((kp.y - 64.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_keypoint_names_in_order() {
        let raw = instance(0.5, 0.5, 0.9, 0.8);
        let poses = decode_poses(&raw, &identity_letterbox(), POSE_SCORE_THRESHOLD);
        let parts: Vec<&str> = poses[0].keypoints.iter().map(|k| k.part.as_str()).collect();
        assert_eq!(parts.len(), KEYPOINT_COUNT);
        assert_eq!(parts[0], "nose");
        assert_eq!(parts[16], "right_ankle");
    }

    #[test]
    fn test_decode_empty_output() {
        let poses = decode_poses(&[], &identity_letterbox(), POSE_SCORE_THRESHOLD);
        assert!(poses.is_empty());
    }

    #[test]
    fn test_preprocess_int_tensor_shape() {
        let image = RgbImage::from_pixel(512, 256, image::Rgb([200, 100, 50]));
        let (tensor, letterbox) = preprocess(&image);
        assert_eq!(
            tensor.shape(),
            &[1, POSE_INPUT_SIZE as usize, POSE_INPUT_SIZE as usize, 3]
        );
        assert_eq!(letterbox.pad_x, 0.0);
        assert!(letterbox.pad_y > 0.0);
        let mid = POSE_INPUT_SIZE as usize / 2;
        assert_eq!(tensor[[0, mid, mid, 0]], 200);
    }
}
