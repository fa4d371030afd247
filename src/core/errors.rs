//! QCR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, QcError>;

/// Top-level error type for the QC asset crawler.
#[derive(Debug, Error)]
pub enum QcError {
    #[error("[QCR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[QCR-1002] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[QCR-2001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[QCR-2002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error(
        "[QCR-2003] sidecar {path} has schema version {found} newer than supported {supported}"
    )]
    SchemaTooNew {
        path: PathBuf,
        found: String,
        supported: String,
    },

    #[error("[QCR-3001] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[QCR-3002] run interrupted by signal")]
    Interrupted,
}

impl QcError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "QCR-1001",
            Self::ConfigParse { .. } => "QCR-1002",
            Self::Io { .. } => "QCR-2001",
            Self::Serialization { .. } => "QCR-2002",
            Self::SchemaTooNew { .. } => "QCR-2003",
            Self::ChannelClosed { .. } => "QCR-3001",
            Self::Interrupted => "QCR-3002",
        }
    }

    /// Whether the error aborts the run (configuration and interrupt) or is a
    /// per-asset soft failure the crawl continues past.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::ConfigParse { .. } | Self::Interrupted
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for QcError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}
