//! The scan engine: one image in, objects + emotions + poses out.
//!
//! Object classification goes through the acquisition controller; the face
//! and pose backends run on a dedicated OS thread behind a channel, since
//! their sessions want `&mut` and their inference is blocking.

use crate::config::Config;
use image::RgbImage;
use scanlens_core::{emotion, Detection, EmotionReading, FaceMesher, Pose, PoseEstimator};
use scanlens_models::catalog::{FACE_MESH_MODEL, POSE_MODEL};
use scanlens_models::fetch::FetchError;
use scanlens_models::{ClassifyError, InitError, ModelController, ModelFetcher, OrtLoader};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model acquisition failed: {0}")]
    Init(#[from] InitError),
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),
    #[error("model fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("face mesh: {0}")]
    FaceMesh(#[from] scanlens_core::facemesh::FaceMeshError),
    #[error("pose: {0}")]
    Pose(#[from] scanlens_core::pose::PoseError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Everything one scan produces.
pub struct ScanReport {
    pub objects: Vec<Detection>,
    pub emotions: Vec<EmotionReading>,
    pub poses: Vec<Pose>,
    /// True when the last-resort classifier produced `objects`.
    pub used_fallback: bool,
}

struct FacePoseReadings {
    emotions: Vec<EmotionReading>,
    poses: Vec<Pose>,
}

/// Messages sent to the face/pose engine thread.
enum EngineRequest {
    Analyze {
        image: RgbImage,
        reply: oneshot::Sender<Result<FacePoseReadings, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn analyze(&self, image: RgbImage) -> Result<FacePoseReadings, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Aggregate recognition engine over the three perception backends.
pub struct ScanEngine {
    controller: ModelController,
    faces: EngineHandle,
    confidence_threshold: f32,
}

impl ScanEngine {
    /// Load all three perception backends concurrently, reporting coarse
    /// progress as each component completes (final call is always 100).
    pub async fn bootstrap<F>(config: &Config, on_progress: F) -> Result<Self, EngineError>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let fetcher = ModelFetcher::new(config.model_dir.clone(), config.cache_dir.clone());
        let controller = ModelController::new(Arc::new(OrtLoader::new(fetcher.clone())));
        let progress = Arc::new(MilestoneProgress::new(3, on_progress));

        let classifier_fut = {
            let controller = controller.clone();
            let progress = progress.clone();
            async move {
                controller
                    .initialize_with_progress(|pct| {
                        tracing::debug!(pct, "classifier backend loading");
                    })
                    .await?;
                progress.bump();
                Ok::<_, EngineError>(())
            }
        };
        let face_fut = {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_hub_file(FACE_MESH_MODEL.0, FACE_MESH_MODEL.1).await }
        };
        let pose_fut = {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_hub_file(POSE_MODEL.0, POSE_MODEL.1).await }
        };

        let (_, face_path, pose_path) = tokio::try_join!(
            classifier_fut,
            async { face_fut.await.map_err(EngineError::from) },
            async { pose_fut.await.map_err(EngineError::from) },
        )?;

        // Session construction is blocking; build both off the async threads
        // and bump a milestone per backend, matching the per-model progress
        // of the load sequence above.
        let face_threshold = config.face_presence_threshold;
        let pose_threshold = config.pose_score_threshold;
        let build_progress = progress.clone();
        let (mesher, poser) = tokio::task::spawn_blocking(move || {
            let mesher = FaceMesher::load(&face_path.to_string_lossy())?
                .with_presence_threshold(face_threshold);
            build_progress.bump();
            let poser = PoseEstimator::load(&pose_path.to_string_lossy())?
                .with_score_threshold(pose_threshold);
            build_progress.bump();
            Ok::<_, EngineError>((mesher, poser))
        })
        .await
        .map_err(|_| EngineError::ChannelClosed)??;

        Ok(Self {
            controller,
            faces: spawn_face_pose_thread(mesher, poser),
            confidence_threshold: config.confidence_threshold,
        })
    }

    /// Run all three detections over one decoded image.
    pub async fn scan(&self, image: &RgbImage) -> Result<ScanReport, EngineError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EngineError::Classify(ClassifyError::InvalidImage {
                width,
                height,
            }));
        }

        let (objects, readings) = tokio::join!(
            self.controller.classify(image),
            self.faces.analyze(image.clone()),
        );
        let objects = objects?;
        let readings = readings?;

        let used_fallback = self.controller.using_fallback();
        Ok(ScanReport {
            objects: filter_primary(objects, used_fallback, self.confidence_threshold),
            emotions: readings.emotions,
            poses: readings.poses,
            used_fallback,
        })
    }

    /// Description of the active classification backend.
    pub fn active_backend(&self) -> Option<String> {
        self.controller.active_backend()
    }
}

/// Primary detections are held to the confidence threshold; the fixed-vocab
/// fallback returns its top-k unfiltered.
fn filter_primary(
    mut objects: Vec<Detection>,
    used_fallback: bool,
    threshold: f32,
) -> Vec<Detection> {
    if !used_fallback {
        objects.retain(|d| d.confidence >= threshold);
    }
    objects
}

/// Spawn the face/pose inference thread. The thread owns both sessions and
/// drains requests until every handle is dropped.
fn spawn_face_pose_thread(mut mesher: FaceMesher, mut poser: PoseEstimator) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::spawn(move || {
        while let Some(request) = rx.blocking_recv() {
            match request {
                EngineRequest::Analyze { image, reply } => {
                    let result = analyze(&mut mesher, &mut poser, &image);
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("face/pose engine thread exiting");
    });

    EngineHandle { tx }
}

fn analyze(
    mesher: &mut FaceMesher,
    poser: &mut PoseEstimator,
    image: &RgbImage,
) -> Result<FacePoseReadings, EngineError> {
    let faces = mesher.estimate(image)?;
    let emotions = faces
        .iter()
        .filter_map(|face| emotion::estimate(&face.landmarks))
        .collect();
    let poses = poser.estimate(image)?;
    Ok(FacePoseReadings { emotions, poses })
}

/// Coarse per-component progress: each completed component advances the
/// percentage by an equal share; the last bump lands exactly on 100.
struct MilestoneProgress {
    total: usize,
    done: AtomicUsize,
    callback: Box<dyn Fn(u8) + Send + Sync>,
}

impl MilestoneProgress {
    fn new(total: usize, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            total: total.max(1),
            done: AtomicUsize::new(0),
            callback: Box::new(callback),
        }
    }

    fn bump(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let pct = (done.min(self.total) * 100 / self.total) as u8;
        (self.callback)(pct);
    }
}
