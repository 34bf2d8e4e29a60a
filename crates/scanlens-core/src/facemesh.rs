//! 468-point face-landmark estimator via ONNX Runtime.
//!
//! Wraps a MediaPipe-style face mesh export: one 192×192 RGB input, one
//! flat 1404-float landmark tensor (468 × xyz in input-pixel coordinates)
//! and one face-presence score. Landmarks are de-mapped through the
//! letterbox transform back into original image coordinates.

use crate::types::FaceGeometry;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACEMESH_INPUT_SIZE: u32 = 192;
const FACEMESH_LANDMARK_COUNT: usize = 468;
/// Faces below this presence score are dropped.
const FACE_PRESENCE_THRESHOLD: f32 = 0.8;

#[derive(Error, Debug)]
pub enum FaceMeshError {
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

/// Face mesh estimator.
pub struct FaceMesher {
    session: Session,
    presence_threshold: f32,
}

impl FaceMesher {
    /// Load the face mesh ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, FaceMeshError> {
        if !Path::new(model_path).exists() {
            return Err(FaceMeshError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face mesh model"
        );

        Ok(Self {
            session,
            presence_threshold: FACE_PRESENCE_THRESHOLD,
        })
    }

    pub fn with_presence_threshold(mut self, threshold: f32) -> Self {
        self.presence_threshold = threshold;
        self
    }

    /// Estimate face landmarks for the dominant face in the image.
    ///
    /// Returns an empty vector when no face clears the presence threshold;
    /// the sequence shape leaves room for a multi-face mesh later.
    pub fn estimate(&mut self, image: &RgbImage) -> Result<Vec<FaceGeometry>, FaceMeshError> {
        let (input, letterbox) = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_landmarks) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceMeshError::InferenceFailed(format!("landmarks: {e}")))?;
        let (_, raw_presence) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceMeshError::InferenceFailed(format!("presence: {e}")))?;

        if raw_landmarks.len() < FACEMESH_LANDMARK_COUNT * 3 {
            return Err(FaceMeshError::InferenceFailed(format!(
                "expected {} landmark floats, got {}",
                FACEMESH_LANDMARK_COUNT * 3,
                raw_landmarks.len()
            )));
        }

        let presence = sigmoid(raw_presence.first().copied().unwrap_or(f32::NEG_INFINITY));
        if presence < self.presence_threshold {
            tracing::debug!(presence, "no face above presence threshold");
            return Ok(Vec::new());
        }

        let landmarks = decode_landmarks(raw_landmarks, &letterbox);
        Ok(vec![FaceGeometry {
            landmarks,
            presence,
        }])
    }
}

/// Letterbox-resize into the square model input, normalized to [0, 1], NCHW.
fn preprocess(image: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = image.dimensions();
    let input = FACEMESH_INPUT_SIZE;

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

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let ty = y as usize + pad_y_start;
        let tx = x as usize + pad_x_start;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = pixel.0[c] as f32 / 255.0;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Map raw landmark floats (input-pixel xyz triples) back to image space.
fn decode_landmarks(raw: &[f32], letterbox: &LetterboxInfo) -> Vec<(f32, f32, f32)> {
    raw.chunks_exact(3)
        .take(FACEMESH_LANDMARK_COUNT)
        .map(|xyz| {
            (
                (xyz[0] - letterbox.pad_x) / letterbox.scale,
                (xyz[1] - letterbox.pad_y) / letterbox.scale,
                xyz[2] / letterbox.scale,
            )
        })
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_bounds() {
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_identity() {
        // No padding, unit scale: coordinates pass through unchanged.
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let raw = vec![10.0, 20.0, 1.5];
        let pts = decode_landmarks(&raw, &letterbox);
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0], (10.0, 20.0, 1.5));
    }

    #[test]
    fn test_decode_landmarks_demaps_letterbox() {
        // 2x scale with horizontal padding of 16px.
        let letterbox = LetterboxInfo {
            scale: 2.0,
            pad_x: 16.0,
            pad_y: 0.0,
        };
        let raw = vec![116.0, 100.0, 4.0];
        let pts = decode_landmarks(&raw, &letterbox);
        assert_eq!(pts[0], (50.0, 50.0, 2.0));
    }

    #[test]
    fn test_decode_landmarks_caps_at_mesh_size() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let raw = vec![0.0; (FACEMESH_LANDMARK_COUNT + 10) * 3];
        let pts = decode_landmarks(&raw, &letterbox);
        assert_eq!(pts.len(), FACEMESH_LANDMARK_COUNT);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        // Wide image: letterbox pads top/bottom, content occupies full width.
        let image = RgbImage::from_pixel(640, 320, image::Rgb([255, 255, 255]));
        let (tensor, letterbox) = preprocess(&image);
        assert_eq!(
            tensor.shape(),
            &[1, 3, FACEMESH_INPUT_SIZE as usize, FACEMESH_INPUT_SIZE as usize]
        );
        assert_eq!(letterbox.pad_x, 0.0);
        assert!(letterbox.pad_y > 0.0);
        // Padded rows stay zero, content rows are 1.0.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let mid = FACEMESH_INPUT_SIZE as usize / 2;
        assert!((tensor[[0, 0, mid, mid]] - 1.0).abs() < 1e-6);
    }
}
