//! Error taxonomy for acquisition and classification.
//!
//! Per-candidate failures are captured as plain data (strings, not library
//! error objects) so the aggregate error stays clonable across every waiter
//! of a shared initialization attempt.

use std::fmt;
use thiserror::Error;

/// What went wrong with one backend candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The requested execution device is not usable on this host.
    DeviceUnavailable,
    /// The model could not be retrieved (network or cache failure).
    FetchFailed,
    /// The model was retrieved but could not be parsed or loaded.
    ModelRejected,
}

/// One swallowed-and-logged failure from the fallback cascade.
#[derive(Debug, Clone)]
pub struct CandidateFailure {
    /// Candidate description, e.g. `mobilevit-small (cuda)`.
    pub backend: String,
    pub kind: FailureKind,
    pub message: String,
}

impl CandidateFailure {
    pub fn new(backend: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.message)
    }
}

/// Fatal initialization outcome. Only total exhaustion is surfaced;
/// individual candidate failures ride along as context.
#[derive(Error, Debug, Clone)]
pub enum InitError {
    #[error("{}", describe_failures(.failures))]
    AllBackendsExhausted { failures: Vec<CandidateFailure> },
}

/// Distinguish device starvation from fetch/parse exhaustion in the
/// aggregate message.
fn describe_failures(failures: &[CandidateFailure]) -> String {
    if failures.is_empty() {
        return "no backend candidates were attempted".to_string();
    }
    let detail = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    if failures
        .iter()
        .all(|f| f.kind == FailureKind::DeviceUnavailable)
    {
        format!("no supported execution device available: {detail}")
    } else {
        format!("all backend candidates exhausted, models failed to fetch or load: {detail}")
    }
}

/// Classification-time errors, surfaced directly to the caller.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("backend not initialized")]
    NotInitialized(#[source] InitError),
    #[error("invalid image: {width}x{height}")]
    InvalidImage { width: u32, height: u32 },
    #[error("inference failed: {0}")]
    Inference(String),
}
