//! Heuristic emotion estimator over face-mesh landmarks.
//!
//! Not a trained model: three facial distances (mouth opening, brow-to-eye
//! gap, eye opening) are each squashed into [0, 1] by a fixed linear scale
//! and clamp, then combined through fixed per-emotion threshold rules into
//! a pseudo-probability vector. The thresholds are policy constants, not
//! calibrated values.

use crate::types::EmotionReading;

pub const EMOTION_LABELS: [&str; 7] = [
    "angry", "disgust", "fear", "happy", "sad", "surprise", "neutral",
];

// Face-mesh landmark indices (468-point topology).
const UPPER_LIP: usize = 13;
const LOWER_LIP: usize = 14;
const LEFT_BROW: usize = 63;
const RIGHT_BROW: usize = 294;
const LEFT_EYE_TOP: usize = 159;
const LEFT_EYE_BOTTOM: usize = 145;
const RIGHT_EYE_TOP: usize = 386;
const RIGHT_EYE_BOTTOM: usize = 374;

// Linear scales mapping pixel distances into [0, 1].
const MOUTH_OPEN_SCALE: f32 = 30.0;
const BROW_RAISE_SCALE: f32 = 20.0;
const EYE_OPEN_SCALE: f32 = 10.0;

/// Derive an emotion read from a full face mesh.
///
/// Returns `None` when the mesh does not carry the landmarks the features
/// index into (defensively short meshes never panic).
pub fn estimate(landmarks: &[(f32, f32, f32)]) -> Option<EmotionReading> {
    let required = [
        UPPER_LIP,
        LOWER_LIP,
        LEFT_BROW,
        RIGHT_BROW,
        LEFT_EYE_TOP,
        LEFT_EYE_BOTTOM,
        RIGHT_EYE_TOP,
        RIGHT_EYE_BOTTOM,
    ];
    if required.iter().any(|&i| i >= landmarks.len()) {
        return None;
    }

    let mouth = mouth_openness(landmarks);
    let brow = eyebrow_raise(landmarks);
    let eye = eye_openness(landmarks);

    let scores = emotion_scores(mouth, brow, eye);
    let (best, &confidence) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    Some(EmotionReading {
        emotion: EMOTION_LABELS[best].to_string(),
        confidence,
    })
}

/// Vertical lip gap, normalized.
fn mouth_openness(landmarks: &[(f32, f32, f32)]) -> f32 {
    let gap = landmarks[LOWER_LIP].1 - landmarks[UPPER_LIP].1;
    (gap / MOUTH_OPEN_SCALE).clamp(0.0, 1.0)
}

/// Brow height above eye level, normalized. Image y grows downward, so a
/// raised brow sits at a smaller y than the eyes.
fn eyebrow_raise(landmarks: &[(f32, f32, f32)]) -> f32 {
    let brow = (landmarks[LEFT_BROW].1 + landmarks[RIGHT_BROW].1) / 2.0;
    let eye_level = (landmarks[LEFT_EYE_TOP].1 + landmarks[RIGHT_EYE_TOP].1) / 2.0;
    ((eye_level - brow) / BROW_RAISE_SCALE).clamp(0.0, 1.0)
}

/// Mean vertical eyelid gap across both eyes, normalized.
fn eye_openness(landmarks: &[(f32, f32, f32)]) -> f32 {
    let left = (landmarks[LEFT_EYE_BOTTOM].1 - landmarks[LEFT_EYE_TOP].1) / EYE_OPEN_SCALE;
    let right = (landmarks[RIGHT_EYE_BOTTOM].1 - landmarks[RIGHT_EYE_TOP].1) / EYE_OPEN_SCALE;
    ((left + right) / 2.0).clamp(0.0, 1.0)
}

/// Fixed threshold rules per emotion, in EMOTION_LABELS order.
fn emotion_scores(mouth: f32, brow: f32, eye: f32) -> [f32; 7] {
    [
        // angry: raised brows + wide eyes
        if brow > 0.7 && eye > 0.7 { 0.8 } else { 0.1 },
        // disgust: not separable from these three features
        0.05,
        // fear: very wide eyes + open mouth
        if eye > 0.8 && mouth > 0.6 { 0.7 } else { 0.1 },
        // happy: open mouth dominates
        if mouth > 0.5 { 0.9 } else { 0.3 },
        // sad: raised brows alone
        if brow > 0.7 { 0.6 } else { 0.2 },
        // surprise: mouth and eyes both wide
        if mouth > 0.7 && eye > 0.9 { 0.8 } else { 0.1 },
        // neutral baseline
        0.3,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A flat 468-point mesh with every landmark at the same position.
    fn neutral_mesh() -> Vec<(f32, f32, f32)> {
        vec![(100.0, 100.0, 0.0); 468]
    }

    fn set_y(mesh: &mut [(f32, f32, f32)], index: usize, y: f32) {
        mesh[index].1 = y;
    }

    #[test]
    fn test_neutral_when_nothing_moves() {
        let reading = estimate(&neutral_mesh()).unwrap();
        // All features zero → happy(0.3) ties neutral(0.3); max_by keeps the
        // later of equal entries, which is the neutral baseline.
        assert_eq!(reading.emotion, "neutral");
        assert!((reading.confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_open_mouth_reads_happy() {
        let mut mesh = neutral_mesh();
        set_y(&mut mesh, UPPER_LIP, 100.0);
        set_y(&mut mesh, LOWER_LIP, 120.0); // gap 20 / 30 = 0.67 > 0.5
        let reading = estimate(&mesh).unwrap();
        assert_eq!(reading.emotion, "happy");
        assert!((reading.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_happy_outranks_surprise_when_both_fire() {
        let mut mesh = neutral_mesh();
        set_y(&mut mesh, UPPER_LIP, 100.0);
        set_y(&mut mesh, LOWER_LIP, 125.0); // mouth 0.83
        set_y(&mut mesh, LEFT_EYE_TOP, 100.0);
        set_y(&mut mesh, LEFT_EYE_BOTTOM, 110.0); // left eye fully open
        set_y(&mut mesh, RIGHT_EYE_TOP, 100.0);
        set_y(&mut mesh, RIGHT_EYE_BOTTOM, 110.0); // eye 1.0
        // happy also fires at 0.9; surprise must not lose to it.
        let scores = emotion_scores(0.83, 0.0, 1.0);
        assert!((scores[5] - 0.8).abs() < 1e-6);
        let reading = estimate(&mesh).unwrap();
        assert_eq!(reading.emotion, "happy"); // 0.9 beats surprise 0.8
    }

    #[test]
    fn test_raised_brows_read_sad() {
        let mut mesh = neutral_mesh();
        set_y(&mut mesh, LEFT_BROW, 80.0);
        set_y(&mut mesh, RIGHT_BROW, 80.0); // 20px above eye level → 1.0
        let reading = estimate(&mesh).unwrap();
        assert_eq!(reading.emotion, "sad");
    }

    #[test]
    fn test_raised_brows_wide_eyes_read_angry() {
        let mut mesh = neutral_mesh();
        set_y(&mut mesh, LEFT_BROW, 80.0);
        set_y(&mut mesh, RIGHT_BROW, 80.0);
        set_y(&mut mesh, LEFT_EYE_BOTTOM, 110.0);
        set_y(&mut mesh, RIGHT_EYE_BOTTOM, 110.0);
        let reading = estimate(&mesh).unwrap();
        assert_eq!(reading.emotion, "angry");
        assert!((reading.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_short_mesh_returns_none() {
        let mesh = vec![(0.0, 0.0, 0.0); 10];
        assert!(estimate(&mesh).is_none());
    }

    #[test]
    fn test_features_clamped() {
        let mut mesh = neutral_mesh();
        set_y(&mut mesh, UPPER_LIP, 0.0);
        set_y(&mut mesh, LOWER_LIP, 500.0);
        assert!((mouth_openness(&mesh) - 1.0).abs() < 1e-6);
        set_y(&mut mesh, LOWER_LIP, -500.0);
        assert_eq!(mouth_openness(&mesh), 0.0);
    }
}
