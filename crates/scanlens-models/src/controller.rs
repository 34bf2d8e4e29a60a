//! The model acquisition controller.
//!
//! One `LoadState` per controller is the sole shared mutable state:
//! `Uninitialized → Initializing → {Ready | Failed}`, with `Failed`
//! re-entering `Initializing` on an explicit retry and `Ready` terminal
//! until `reset()`. Exactly one cascade runs at a time; concurrent
//! `initialize()` callers join the in-flight attempt through a watch
//! channel and adopt its outcome. The cascade itself runs in a spawned
//! task, so a caller that stops awaiting cannot leave the state torn.

use crate::catalog::BackendCandidate;
use crate::error::{CandidateFailure, ClassifyError, InitError};
use async_trait::async_trait;
use image::RgbImage;
use scanlens_core::types::top_k;
use scanlens_core::Detection;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Cap on detections returned from a classify call.
const TOP_K: usize = 5;

/// A ready-to-use classification backend. Inference takes `&mut` because
/// ort sessions do; the controller serializes access behind a mutex.
pub trait ClassifierBackend: Send {
    fn classify(&mut self, image: &RgbImage) -> Result<Vec<Detection>, ClassifyError>;
}

/// Seam through which the controller acquires backends. Production code
/// uses [`crate::OrtLoader`]; tests script failures per candidate.
#[async_trait]
pub trait BackendLoader: Send + Sync {
    /// The fixed prioritized candidate list this loader understands.
    fn candidates(&self) -> Vec<BackendCandidate>;

    async fn load_candidate(
        &self,
        candidate: &BackendCandidate,
    ) -> Result<Box<dyn ClassifierBackend>, CandidateFailure>;

    /// The last-resort, independently hosted backend.
    async fn load_fallback(&self) -> Result<Box<dyn ClassifierBackend>, CandidateFailure>;
}

#[derive(Clone)]
struct ReadyBackend {
    backend: Arc<Mutex<Box<dyn ClassifierBackend>>>,
    description: String,
    is_fallback: bool,
}

enum LoadState {
    Uninitialized,
    Initializing,
    Ready(ReadyBackend),
    Failed(InitError),
}

impl LoadState {
    fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

struct Inner {
    loader: Arc<dyn BackendLoader>,
    state: Mutex<LoadState>,
    /// Generation counter bumped every time an attempt settles.
    settled: watch::Sender<u64>,
}

/// Clone-safe handle to the shared controller state.
#[derive(Clone)]
pub struct ModelController {
    inner: Arc<Inner>,
}

impl ModelController {
    pub fn new(loader: Arc<dyn BackendLoader>) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                loader,
                state: Mutex::new(LoadState::Uninitialized),
                settled,
            }),
        }
    }

    /// Ensure a backend is ready. Safe to call concurrently; all callers of
    /// one in-flight attempt resolve to that attempt's outcome.
    pub async fn initialize(&self) -> Result<(), InitError> {
        self.initialize_with_progress(|_| {}).await
    }

    /// Like [`initialize`](Self::initialize), reporting monotonic progress
    /// percentages. On success the callback sees `100` exactly once. Only
    /// the caller that owns the attempt observes progress; joiners just
    /// await the outcome.
    pub async fn initialize_with_progress<F>(&self, on_progress: F) -> Result<(), InitError>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let owner = {
            let mut state = self.lock_state();
            match &*state {
                LoadState::Ready(_) => return Ok(()),
                LoadState::Initializing => false,
                LoadState::Uninitialized | LoadState::Failed(_) => {
                    *state = LoadState::Initializing;
                    true
                }
            }
        };

        if owner {
            self.spawn_cascade(on_progress);
        }

        // Join the in-flight attempt (our own included) and adopt its outcome.
        let mut rx = self.inner.settled.subscribe();
        loop {
            {
                let state = self.lock_state();
                match &*state {
                    LoadState::Ready(_) => return Ok(()),
                    LoadState::Failed(err) => return Err(err.clone()),
                    _ => {}
                }
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as `inner`; unreachable here.
                unreachable!("settle channel closed while controller alive");
            }
        }
    }

    /// Classify an image, lazily initializing on first use.
    ///
    /// Results are sorted by descending confidence and capped at five. The
    /// zero-dimension check runs before any backend dispatch, initialization
    /// included.
    pub async fn classify(&self, image: &RgbImage) -> Result<Vec<Detection>, ClassifyError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifyError::InvalidImage { width, height });
        }

        let ready = loop {
            self.initialize()
                .await
                .map_err(ClassifyError::NotInitialized)?;
            if let Some(ready) = self.ready_backend() {
                break ready;
            }
            // Lost a race with reset(); initialize again.
        };

        let image = image.clone();
        let backend = ready.backend;
        let detections = tokio::task::spawn_blocking(move || {
            let mut guard = backend.lock().expect("backend lock poisoned");
            guard.classify(&image)
        })
        .await
        .map_err(|e| ClassifyError::Inference(format!("inference task failed: {e}")))??;

        Ok(top_k(detections, TOP_K))
    }

    /// Whether the last-resort backend is the active one.
    pub fn using_fallback(&self) -> bool {
        matches!(&*self.lock_state(), LoadState::Ready(r) if r.is_fallback)
    }

    /// Description of the active backend, if ready.
    pub fn active_backend(&self) -> Option<String> {
        match &*self.lock_state() {
            LoadState::Ready(r) => Some(r.description.clone()),
            _ => None,
        }
    }

    /// Current state name, for status surfaces.
    pub fn state_name(&self) -> &'static str {
        self.lock_state().name()
    }

    /// Drop a ready or failed backend so the next initialize starts over.
    /// An in-flight attempt is left alone.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        match &*state {
            LoadState::Initializing => {}
            _ => *state = LoadState::Uninitialized,
        }
    }

    fn ready_backend(&self) -> Option<ReadyBackend> {
        match &*self.lock_state() {
            LoadState::Ready(r) => Some(r.clone()),
            _ => None,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoadState> {
        self.inner.state.lock().expect("load state lock poisoned")
    }

    /// Run the cascade in its own task: an attempt that started always
    /// completes and settles LoadState, even if every caller went away.
    fn spawn_cascade<F>(&self, on_progress: F)
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let progress = ProgressReporter::new(on_progress);
            let outcome = run_cascade(inner.loader.as_ref(), &progress).await;

            let succeeded = outcome.is_ok();
            {
                let mut state = inner.state.lock().expect("load state lock poisoned");
                *state = match outcome {
                    Ok(ready) => LoadState::Ready(ready),
                    Err(err) => LoadState::Failed(err),
                };
            }
            if succeeded {
                progress.finish();
            }
            inner.settled.send_modify(|generation| *generation += 1);
        });
    }
}

/// Attempt every candidate in priority order, then the fallback.
async fn run_cascade(
    loader: &dyn BackendLoader,
    progress: &ProgressReporter,
) -> Result<ReadyBackend, InitError> {
    let candidates = loader.candidates();
    let total_steps = candidates.len() + 1;
    let mut failures = Vec::new();

    for (step, candidate) in candidates.iter().enumerate() {
        progress.update((step * 100 / total_steps) as u8);
        match loader.load_candidate(candidate).await {
            Ok(backend) => {
                tracing::info!(backend = %candidate, "classification backend ready");
                return Ok(ReadyBackend {
                    backend: Arc::new(Mutex::new(backend)),
                    description: candidate.to_string(),
                    is_fallback: false,
                });
            }
            Err(failure) => {
                tracing::warn!(%failure, "backend candidate failed, trying next");
                failures.push(failure);
            }
        }
    }

    progress.update((candidates.len() * 100 / total_steps) as u8);
    match loader.load_fallback().await {
        Ok(backend) => {
            tracing::info!("all primary candidates failed, fallback backend ready");
            Ok(ReadyBackend {
                backend: Arc::new(Mutex::new(backend)),
                description: "fallback".to_string(),
                is_fallback: true,
            })
        }
        Err(failure) => {
            tracing::warn!(%failure, "fallback backend failed");
            failures.push(failure);
            Err(InitError::AllBackendsExhausted { failures })
        }
    }
}

/// Monotonic progress with a single terminal 100.
struct ProgressReporter {
    callback: Box<dyn Fn(u8) + Send + Sync>,
    last: AtomicU8,
    finished: AtomicBool,
}

impl ProgressReporter {
    fn new(callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            last: AtomicU8::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// Report best-effort progress; regressions are swallowed and 100 is
    /// reserved for [`finish`](Self::finish).
    fn update(&self, percent: u8) {
        let percent = percent.min(99);
        let previous = self.last.fetch_max(percent, Ordering::Relaxed);
        if percent > previous {
            (self.callback)(percent);
        }
    }

    /// Emit the terminal 100, exactly once.
    fn finish(&self) {
        if !self.finished.swap(true, Ordering::Relaxed) {
            self.last.store(100, Ordering::Relaxed);
            (self.callback)(100);
        }
    }
}
