//! Error types for the cloudfx pipeline
//!
//! - Upload failures (transport, HTTP status, service rejection)
//! - Render probe failures (non-fatal, drive polling)
//! - Configuration errors
//! - Pipeline-level errors returned from session operations

use cloudfx_transform::{CatalogError, CompositionError};
use url::Url;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Upload to the remote service failed
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Transform request could not be composed
    #[error("composition failed: {0}")]
    Composition(#[from] CompositionError),

    /// Operation name is not dispatchable or not in the catalog
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// No operation selected before `apply_selected`
    #[error("no operation selected")]
    NothingSelected,

    /// Reset requested before any baseline upload
    #[error("no baseline image uploaded")]
    NoBaseline,

    /// Wait requested with no URL pending or published
    #[error("no image url pending")]
    NothingPending,

    /// Derived asset never became decodable
    #[error("{url} not decodable after {attempts} attempts")]
    DecodeTimeout {
        /// URL that was polled
        url: Url,
        /// Probes made before giving up
        attempts: u32,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Catalog error
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Session state channel closed
    #[error("session closed")]
    Closed,
}

impl PipelineError {
    /// Check if the operation can be retried as-is
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upload(e) => e.is_retryable(),
            Self::DecodeTimeout { .. } => true,
            _ => false,
        }
    }
}

/// Upload failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Connection or request-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded the configured timeout
    #[error("upload timed out")]
    Timeout,

    /// Service answered with an error body
    #[error("rejected ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Service error message
        message: String,
    },

    /// Non-success status without a recognizable error body
    #[error("unexpected status {status}")]
    Status {
        /// HTTP status
        status: u16,
        /// Raw body (truncated)
        body: String,
    },

    /// Success status but the body lacked the expected fields
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl UploadError {
    /// Check if retrying could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Rejected { status, .. } | Self::Status { status, .. } => {
                *status == 429 || *status >= 500
            }
            Self::MalformedResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Why a render probe did not confirm the URL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// Request failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status (typically 404 or 420 while rendering)
    #[error("status {0}")]
    Status(u16),

    /// Body was not a decodable image
    #[error("decode failed: {0}")]
    Decode(String),

    /// Body is in a format this build cannot decode
    #[error("unsupported image format: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required value absent or empty
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// Value present but unusable
    #[error("invalid setting {key}: {message}")]
    Invalid {
        /// Setting name
        key: &'static str,
        /// What was wrong
        message: String,
    },

    /// TOML document did not parse
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file unreadable
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
}
