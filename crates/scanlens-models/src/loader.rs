//! Production backend loader: fetch + ort session construction.

use crate::catalog::{self, BackendCandidate, ExecDevice};
use crate::controller::{BackendLoader, ClassifierBackend};
use crate::error::{CandidateFailure, ClassifyError, FailureKind};
use crate::fetch::ModelFetcher;
use async_trait::async_trait;
use image::RgbImage;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use scanlens_core::{Detection, ObjectClassifier, Vocabulary};
use std::path::{Path, PathBuf};

/// Build an ort session pinned to one execution device.
///
/// The CUDA provider registers with hard failure so an unusable GPU surfaces
/// as an error here instead of silently running on CPU and shadowing the
/// dedicated CPU candidate.
fn build_session(model_path: &Path, device: ExecDevice) -> Result<Session, ort::Error> {
    let builder = Session::builder()?.with_intra_threads(2)?;
    match device {
        ExecDevice::Cuda => builder
            .with_execution_providers([CUDAExecutionProvider::default()
                .build()
                .error_on_failure()])?
            .commit_from_file(model_path),
        ExecDevice::Cpu => builder
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .commit_from_file(model_path),
    }
}

/// Session construction parses large model files; keep it off async threads.
async fn build_session_blocking(
    model_path: PathBuf,
    device: ExecDevice,
) -> Result<Session, String> {
    match tokio::task::spawn_blocking(move || build_session(&model_path, device)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("session build task failed: {e}")),
    }
}

/// An ort-backed classifier behind the controller's backend seam.
struct OrtBackend {
    classifier: ObjectClassifier,
}

impl ClassifierBackend for OrtBackend {
    fn classify(&mut self, image: &RgbImage) -> Result<Vec<Detection>, ClassifyError> {
        self.classifier
            .classify(image)
            .map_err(|e| ClassifyError::Inference(e.to_string()))
    }
}

/// Loads hub candidates and the URL-hosted fallback into ort sessions.
pub struct OrtLoader {
    fetcher: ModelFetcher,
}

impl OrtLoader {
    pub fn new(fetcher: ModelFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl BackendLoader for OrtLoader {
    fn candidates(&self) -> Vec<BackendCandidate> {
        catalog::candidates()
    }

    async fn load_candidate(
        &self,
        candidate: &BackendCandidate,
    ) -> Result<Box<dyn ClassifierBackend>, CandidateFailure> {
        let name = candidate.to_string();
        let model = candidate.model;

        let model_path = self
            .fetcher
            .fetch_hub_file(model.repo_id, model.model_file)
            .await
            .map_err(|e| CandidateFailure::new(&name, FailureKind::FetchFailed, e.to_string()))?;

        let config_path = self
            .fetcher
            .fetch_hub_file(model.repo_id, model.config_file)
            .await
            .map_err(|e| CandidateFailure::new(&name, FailureKind::FetchFailed, e.to_string()))?;
        let raw_config = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| CandidateFailure::new(&name, FailureKind::FetchFailed, e.to_string()))?;
        let vocabulary = Vocabulary::from_config_json(&raw_config)
            .map_err(|e| CandidateFailure::new(&name, FailureKind::ModelRejected, e.to_string()))?;

        let session = build_session_blocking(model_path, candidate.device)
            .await
            .map_err(|e| {
                // A failed CUDA registration means the device path is
                // unusable; a CPU-side failure means the model itself.
                let kind = match candidate.device {
                    ExecDevice::Cuda => FailureKind::DeviceUnavailable,
                    ExecDevice::Cpu => FailureKind::ModelRejected,
                };
                CandidateFailure::new(&name, kind, e.to_string())
            })?;

        Ok(Box::new(OrtBackend {
            classifier: ObjectClassifier::new(session, vocabulary, model.spec),
        }))
    }

    async fn load_fallback(&self) -> Result<Box<dyn ClassifierBackend>, CandidateFailure> {
        let model_path = self
            .fetcher
            .fetch_url(catalog::FALLBACK_MODEL_URL)
            .await
            .map_err(|e| {
                CandidateFailure::new("fallback", FailureKind::FetchFailed, e.to_string())
            })?;

        // Own device probe: try the GPU path, settle for CPU.
        let session = match build_session_blocking(model_path.clone(), ExecDevice::Cuda).await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(error = %e, "fallback: cuda unavailable, using cpu");
                build_session_blocking(model_path, ExecDevice::Cpu)
                    .await
                    .map_err(|e| {
                        CandidateFailure::new(
                            "fallback",
                            FailureKind::ModelRejected,
                            e.to_string(),
                        )
                    })?
            }
        };

        Ok(Box::new(OrtBackend {
            classifier: ObjectClassifier::new(session, Vocabulary::Fixed, catalog::FALLBACK_SPEC),
        }))
    }
}
