//! Typed error hierarchy for the signworks backend.
//!
//! Two top-level enums cover the two non-HTTP subsystems:
//! - `PipelineError` — content-pipeline orchestration failures
//! - `LinkingError` — internal-linking batch failures
//!
//! HTTP handler errors live in `admin::api::ApiError` (they carry response
//! status codes, not domain meaning). Provider errors live next to the
//! provider clients in `providers::ProviderError`.

use thiserror::Error;

use crate::providers::ProviderError;

/// Errors from the content-generation pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("Pipeline run {id} not found")]
    RunNotFound { id: i64 },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the internal-linking batch jobs.
#[derive(Debug, Error)]
pub enum LinkingError {
    #[error("Keyword extraction failed for '{item}': {source}")]
    Extraction {
        item: String,
        #[source]
        source: ProviderError,
    },

    #[error("Invalid link rule: {0}")]
    InvalidRule(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
