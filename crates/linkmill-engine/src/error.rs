//! # Design
//!
//! - Provide structured, constant-message errors for the link engine.
//! - Capture operation context (paths, operation labels) to make failures
//!   reproducible in tests.
//! - Preserve source errors without interpolating context into error
//!   messages.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors produced while materializing a symbolic link.
///
/// Every variant maps onto one reporting kind surfaced on the event channel;
/// none of them abort the stream, the stage always advances to the next
/// record after reporting.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No destination could be resolved for the record.
    #[error("no destination remained for the record")]
    MissingDestination {
        /// Source path of the record left without a destination.
        source_path: PathBuf,
        /// Number of destinations consumed before the failure.
        consumed: usize,
    },
    /// The destination already exists and overwrite was not requested.
    #[error("destination entry already exists")]
    DestinationExists {
        /// Path of the conflicting destination entry.
        path: PathBuf,
    },
    /// The source path could not be stat'ed.
    #[error("link source not found")]
    SourceNotFound {
        /// Source path that failed to stat.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Directory preparation or link creation failed.
    #[error("link io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The platform's alternate linking mechanism also failed.
    #[error("platform link fallback failed")]
    PlatformFallbackFailed {
        /// Path of the link that could not be created.
        path: PathBuf,
        /// Underlying IO error from the fallback attempt.
        source: io::Error,
    },
}

impl LinkError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Stable discriminator used in failure events and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingDestination { .. } => "missing_destination",
            Self::DestinationExists { .. } => "destination_exists",
            Self::SourceNotFound { .. } => "source_not_found",
            Self::Io { .. } => "io",
            Self::PlatformFallbackFailed { .. } => "platform_fallback_failed",
        }
    }

    /// Destination path involved in the failure, when one was resolved.
    #[must_use]
    pub fn destination_path(&self) -> Option<&Path> {
        match self {
            Self::DestinationExists { path }
            | Self::Io { path, .. }
            | Self::PlatformFallbackFailed { path, .. } => Some(path),
            Self::MissingDestination { .. } | Self::SourceNotFound { .. } => None,
        }
    }

    /// Human-readable message including the source error chain.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}
