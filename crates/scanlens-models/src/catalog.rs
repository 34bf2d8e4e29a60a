//! The fixed backend catalog.
//!
//! Candidate order is a compile-time policy: smaller hub models first (they
//! are the ones tuned for interactive use), and for each model the
//! GPU-accelerated execution path before the general-purpose one. The
//! fallback classifier is hosted independently of the hub and carries its
//! own built-in vocabulary.

use scanlens_core::{ClassifierSpec, Normalization};
use std::fmt;

/// Execution device requested from the host, fastest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecDevice {
    /// GPU-accelerated path (CUDA execution provider).
    Cuda,
    /// General-purpose path (CPU execution provider).
    Cpu,
}

impl fmt::Display for ExecDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Device priority used when expanding the candidate list.
pub const DEVICE_PRIORITY: [ExecDevice; 2] = [ExecDevice::Cuda, ExecDevice::Cpu];

/// A hub-hosted classifier model and how to feed it.
#[derive(Debug, Clone, Copy)]
pub struct HubModel {
    pub repo_id: &'static str,
    pub model_file: &'static str,
    /// Carries the `id2label` vocabulary for this model.
    pub config_file: &'static str,
    pub spec: ClassifierSpec,
}

impl HubModel {
    /// Short human-readable name (the repo id without its owner prefix).
    pub fn name(&self) -> &'static str {
        self.repo_id
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(self.repo_id)
    }
}

/// Primary classifier models, in priority order.
pub const PRIMARY_MODELS: [HubModel; 2] = [
    HubModel {
        repo_id: "Xenova/mobilevit-small",
        model_file: "onnx/model.onnx",
        config_file: "config.json",
        spec: ClassifierSpec {
            input_size: 256,
            normalization: Normalization::ZeroToOne,
        },
    },
    HubModel {
        repo_id: "Xenova/vit-base-patch16-224",
        model_file: "onnx/model.onnx",
        config_file: "config.json",
        spec: ClassifierSpec {
            input_size: 224,
            normalization: Normalization::SignedUnit,
        },
    },
];

/// Last-resort classifier, hosted independently of the hub.
pub const FALLBACK_MODEL_URL: &str =
    "https://github.com/onnx/models/raw/main/validated/vision/classification/mobilenet/model/mobilenetv2-10.onnx";

/// Input geometry for the fallback classifier.
pub const FALLBACK_SPEC: ClassifierSpec = ClassifierSpec {
    input_size: 224,
    normalization: Normalization::SignedUnit,
};

/// Face-landmark model coordinates (always needed downstream).
pub const FACE_MESH_MODEL: (&str, &str) = ("onnx-community/mediapipe_face_mesh", "onnx/model.onnx");

/// Pose model coordinates (always needed downstream).
pub const POSE_MODEL: (&str, &str) = (
    "onnx-community/movenet-multipose-lightning",
    "onnx/model.onnx",
);

/// A (model, execution device) pair attempted during initialization.
#[derive(Debug, Clone, Copy)]
pub struct BackendCandidate {
    pub model: HubModel,
    pub device: ExecDevice,
}

impl fmt::Display for BackendCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model.name(), self.device)
    }
}

/// Expand the model list into the full prioritized candidate list:
/// model-major, device fastest-first.
pub fn candidates() -> Vec<BackendCandidate> {
    PRIMARY_MODELS
        .iter()
        .flat_map(|&model| {
            DEVICE_PRIORITY
                .iter()
                .map(move |&device| BackendCandidate { model, device })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_order_is_model_major_device_minor() {
        let list = candidates();
        assert_eq!(list.len(), 4);
        assert_eq!(list[0].model.repo_id, "Xenova/mobilevit-small");
        assert_eq!(list[0].device, ExecDevice::Cuda);
        assert_eq!(list[1].model.repo_id, "Xenova/mobilevit-small");
        assert_eq!(list[1].device, ExecDevice::Cpu);
        assert_eq!(list[2].model.repo_id, "Xenova/vit-base-patch16-224");
        assert_eq!(list[2].device, ExecDevice::Cuda);
        assert_eq!(list[3].device, ExecDevice::Cpu);
    }

    #[test]
    fn test_candidate_display() {
        let c = candidates()[0];
        assert_eq!(c.to_string(), "mobilevit-small (cuda)");
    }

    #[test]
    fn test_model_name_strips_owner() {
        assert_eq!(PRIMARY_MODELS[1].name(), "vit-base-patch16-224");
    }
}
