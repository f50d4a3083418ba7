//! Fatal harness errors.
//!
//! Configuration problems abort a run before any case executes. A malformed
//! suite document is reported as a failing verdict by the runner instead.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("scenario directory not found: {}", path.display())]
    ScenarioDirMissing { path: PathBuf },

    #[error("no scenarios found in {}", path.display())]
    NoScenarios { path: PathBuf },

    #[error("candidate binary not found: {detail}")]
    CandidateNotFound { detail: String },

    #[error("baseline binary not found: {detail}")]
    BaselineNotFound { detail: String },

    #[error("cargo not found; required to run the baseline through `cargo run`")]
    CargoMissing,

    /// The document is not a mapping with a `cases` sequence, or is not
    /// parseable at all.
    #[error("malformed suite {}: {reason}", path.display())]
    MalformedSuite { path: PathBuf, reason: String },

    #[error("invalid config {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },
}

impl HarnessError {
    pub fn malformed_suite(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HarnessError::MalformedSuite {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
