//! Generic ONNX image classifier.
//!
//! One struct covers both the hub-hosted primary models and the fixed-vocab
//! fallback head: the per-model input geometry and pixel normalization come
//! in via [`ClassifierSpec`], the label source via [`Vocabulary`]. Output is
//! always a softmax over class logits reduced to the top-k detections.

use crate::types::{top_k, Detection};
use crate::vocab;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::HashMap;
use thiserror::Error;

/// Number of detections retained from a raw prediction set.
pub const TOP_K: usize = 5;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model produced an empty score vector")]
    EmptyOutput,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Pixel normalization applied during preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// x / 255 → [0, 1]
    ZeroToOne,
    /// (x - 127.5) / 127.5 → [-1, 1]
    SignedUnit,
}

/// Input geometry and normalization for one classifier model.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierSpec {
    /// Square input edge in pixels.
    pub input_size: u32,
    pub normalization: Normalization,
}

/// Where class labels come from.
pub enum Vocabulary {
    /// `id2label` table shipped alongside a hub model.
    Mapped(HashMap<usize, String>),
    /// The built-in fixed table used by the fallback backend.
    Fixed,
}

impl Vocabulary {
    /// Parse the `id2label` map out of a hub model's `config.json`.
    pub fn from_config_json(raw: &str) -> Result<Self, serde_json::Error> {
        #[derive(serde::Deserialize)]
        struct ModelConfig {
            #[serde(default)]
            id2label: HashMap<String, String>,
        }

        let config: ModelConfig = serde_json::from_str(raw)?;
        let map = config
            .id2label
            .into_iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
            .collect();
        Ok(Self::Mapped(map))
    }

    /// Label for a class index; unmapped indices get a stable placeholder.
    pub fn label_for(&self, index: usize) -> String {
        match self {
            Self::Mapped(map) => map
                .get(&index)
                .cloned()
                .unwrap_or_else(|| format!("unknown_{index}")),
            Self::Fixed => vocab::label_for(index),
        }
    }
}

/// ONNX image classifier: session + vocabulary + input spec.
pub struct ObjectClassifier {
    session: Session,
    vocabulary: Vocabulary,
    spec: ClassifierSpec,
}

impl ObjectClassifier {
    /// Wrap an already-built session. The session's execution providers are
    /// the caller's concern; this type only runs inference.
    pub fn new(session: Session, vocabulary: Vocabulary, spec: ClassifierSpec) -> Self {
        Self {
            session,
            vocabulary,
            spec,
        }
    }

    /// Classify an image, returning the top-5 detections sorted descending.
    pub fn classify(&mut self, image: &RgbImage) -> Result<Vec<Detection>, ClassifierError> {
        let input = preprocess(image, self.spec);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("class logits: {e}")))?;

        if logits.is_empty() {
            return Err(ClassifierError::EmptyOutput);
        }

        let scores = softmax(logits);
        Ok(rank_detections(&scores, &self.vocabulary, TOP_K))
    }
}

/// Resize (stretch, bilinear) to the model's square input and produce a
/// normalized NCHW float tensor.
fn preprocess(image: &RgbImage, spec: ClassifierSpec) -> Array4<f32> {
    let size = spec.input_size;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

    let size = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel.0[c] as f32;
            let normalized = match spec.normalization {
                Normalization::ZeroToOne => value / 255.0,
                Normalization::SignedUnit => (value - 127.5) / 127.5,
            };
            tensor[[0, c, y as usize, x as usize]] = normalized;
        }
    }
    tensor
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|&e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

/// Reduce a score vector to the k best labeled detections, sorted descending.
fn rank_detections(scores: &[f32], vocabulary: &Vocabulary, k: usize) -> Vec<Detection> {
    let detections = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| Detection::new(vocabulary.label_for(index), score))
        .collect();
    top_k(detections, k)
}
