//! Error taxonomy for a harvest run.
//!
//! Errors are split by the scope they affect:
//!
//! | Scope | Type | Effect on the run |
//! |-------|------|-------------------|
//! | one record | [`MalformedItem`] | skipped and counted |
//! | one source | [`SourceError`] | source is retried, degraded or failed |
//! | whole run | [`HarvestError`] | run aborts with a non-zero exit |
//!
//! Oversized output is not an error: the renderer truncates the tail and
//! flags the [`Digest`](crate::models::Digest) instead.

use std::time::Duration;
use thiserror::Error;

use crate::models::SourceReport;

/// Failure of one upstream source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Transport, status or auth failure. Never retried.
    #[error("source unavailable: {reason}")]
    Unavailable { reason: String },

    /// Upstream asked us to slow down.
    #[error("source rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

impl SourceError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// An upstream record that could not be turned into an [`Item`](crate::models::Item).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed item: {reason}")]
pub struct MalformedItem {
    pub reason: String,
}

impl MalformedItem {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Invalid window, empty source set, unparseable flags. Raised before any fetch.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("all {} configured sources failed", .0.len())]
    AllSourcesFailed(Vec<SourceReport>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarvestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;
