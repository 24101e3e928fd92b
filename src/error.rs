//! Error taxonomy for an archive run.
//!
//! Failures fall into two groups. Per-item failures ([`ValidationError`] for a
//! malformed post, [`MediaError`] for a single attachment) are counted and the
//! run continues. Everything else is systemic and aborts the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limit exceeded after {attempts} attempts (last status {status})")]
    RateLimitExceeded { status: u16, attempts: u32 },

    #[error("server error after {attempts} attempts (last status {status})")]
    Server { status: u16, attempts: u32 },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected API response {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ArchiveError {
    /// Build a filesystem error for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Auth(_) => 2,
            _ => 1,
        }
    }

    /// Whether this error ends the run rather than a single item.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Validation(_) | Self::Media(_))
    }
}

/// A raw post record that could not be turned into a [`crate::posts::Post`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid post {}: {reason}", post_id.as_deref().unwrap_or("<unknown>"))]
pub struct ValidationError {
    pub post_id: Option<String>,
    pub reason: String,
}

impl ValidationError {
    pub fn new(post_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            post_id: post_id.map(ToString::to_string),
            reason: reason.into(),
        }
    }
}

/// Why a single media item was not archived.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediaError {
    #[error("downloads of {0} media are disabled")]
    Disabled(&'static str),

    #[error("media is {size_mb:.1} MB, over the {limit_mb} MB limit")]
    Oversize { size_mb: f64, limit_mb: u64 },

    #[error("downloaded media failed validation: {0}")]
    Invalid(String),

    #[error("media host returned HTTP {0}")]
    Http(u16),

    #[error("network error fetching media: {0}")]
    Network(String),

    #[error("could not write media file: {0}")]
    Io(String),
}

impl MediaError {
    /// Skipped by policy rather than failed.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Disabled(_) | Self::Oversize { .. })
    }
}
