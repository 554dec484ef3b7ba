//! Error types for model lifecycle management
use std::fmt;

use thiserror::Error;

/// Boxed error type accepted from providers and reclaimers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for model lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for model lifecycle operations
#[derive(Error, Debug)]
pub enum Error {
    /// The provider failed while constructing a model instance.
    ///
    /// The entry is left empty, so a later `get` retries the construction.
    #[error("construction failed for model '{kind}'")]
    Construction {
        /// The model kind, rendered with its `Debug` impl
        kind: String,
        /// The provider's failure
        #[source]
        source: BoxError,
    },

    /// No provider was registered for this model kind.
    #[error("no provider registered for model '{kind}'")]
    UnknownKind {
        /// The model kind, rendered with its `Debug` impl
        kind: String,
    },

    /// The serialized loader is gone; no further constructions can run.
    ///
    /// This happens only after a provider panicked and unwound the loader
    /// thread — the manager is effectively torn down at that point.
    #[error("model loader is shut down")]
    LoaderClosed,
}

impl Error {
    /// Create a construction error for `kind`.
    pub fn construction(kind: &impl fmt::Debug, source: impl Into<BoxError>) -> Self {
        Self::Construction {
            kind: format!("{kind:?}"),
            source: source.into(),
        }
    }

    /// Create an unknown-kind error for `kind`.
    pub fn unknown_kind(kind: &impl fmt::Debug) -> Self {
        Self::UnknownKind {
            kind: format!("{kind:?}"),
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Construction { .. })
    }

    /// Get the model kind associated with this error (if any)
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Construction { kind, .. } | Self::UnknownKind { kind } => Some(kind),
            Self::LoaderClosed => None,
        }
    }
}
