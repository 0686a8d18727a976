//! Error types for the format catalog.

use std::path::PathBuf;

use dtschema_core::{DecodeError, EncodeError, SchemaError};

/// Errors produced by [`FormatCatalog`](crate::FormatCatalog) and the
/// decoding entry points built on it.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// I/O error while reading a definitions file or an artifact.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A definitions file could not be read.
    #[error("failed to read definitions file {path}: {source}")]
    ReadDefinitions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Text sources need the `yaml` feature.
    #[error("cannot load '{source_name}': built without YAML support")]
    UnsupportedSource { source_name: String },

    /// [`install`](crate::install) was called more than once.
    #[error("a process-wide format catalog is already installed")]
    AlreadyInstalled,
}

impl CatalogError {
    /// Decode error carried by this error, if any.
    pub fn as_decode(&self) -> Option<&DecodeError> {
        match self {
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}
