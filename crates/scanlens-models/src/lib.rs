//! scanlens-models — Model acquisition and backend selection.
//!
//! Owns the lifecycle of the object-classification backend: a fixed,
//! prioritized list of (model, execution device) candidates is attempted in
//! order, falling through to a separately hosted generic classifier when
//! every candidate fails. Initialization is de-duplicated across concurrent
//! callers, reports monotonic progress, and memoizes the ready backend for
//! the life of the process.

pub mod catalog;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod loader;

pub use catalog::{candidates, BackendCandidate, ExecDevice, HubModel};
pub use controller::{BackendLoader, ClassifierBackend, ModelController};
pub use error::{CandidateFailure, ClassifyError, FailureKind, InitError};
pub use fetch::ModelFetcher;
pub use loader::OrtLoader;
