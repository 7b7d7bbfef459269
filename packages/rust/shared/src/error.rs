//! Error types for Newsdesk.
//!
//! Library crates use [`NewsdeskError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Newsdesk operations.
#[derive(Debug, thiserror::Error)]
pub enum NewsdeskError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// No news source is registered under the requested slug.
    #[error("news source '{slug}' not found")]
    SourceNotFound { slug: String },

    /// The news source exists but is flagged inactive.
    #[error("news source '{slug}' is not active")]
    SourceInactive { slug: String },

    /// The registry has no adapter for the source's slug.
    #[error("no source implementation found for source: {slug}")]
    UnknownSourceImplementation { slug: String },

    /// Network/HTTP error while talking to an upstream provider.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A single article could not be reconciled into the store.
    #[error("reconcile error: {0}")]
    Reconcile(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Request or data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewsdeskError>;

impl NewsdeskError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a source configuration problem (unknown,
    /// inactive or unimplemented source) rather than a runtime fault.
    pub fn is_source_config(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::SourceInactive { .. }
                | Self::UnknownSourceImplementation { .. }
        )
    }
}
