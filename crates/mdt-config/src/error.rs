//! Error types for mdt-config

use std::path::PathBuf;

use crate::path::KeyPath;

/// Result type for mdt-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or resolving configuration
///
/// None of these are transient. A broken document keeps failing until the
/// input is fixed, so callers should surface them rather than retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The document text is not well-formed YAML
    #[error("Syntax error in {source_name}: {message}")]
    Syntax {
        source_name: String,
        message: String,
    },

    /// A value does not have the type the schema expects at this path
    #[error("Type error at {path}: expected {expected}, found {found}")]
    Type {
        path: KeyPath,
        expected: String,
        found: String,
    },

    /// A required element is missing or has the wrong shape
    #[error("Invalid configuration at {path}: {message}")]
    Structure { path: KeyPath, message: String },

    /// Two merge sources disagree on the kind of node at the same path
    #[error("Merge conflict at {path}: cannot merge {overlay} onto {base}")]
    Conflict {
        path: KeyPath,
        base: String,
        overlay: String,
    },

    /// An override rule pattern is not a valid regular expression
    #[error("Invalid model name pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The store was queried before any document was loaded
    #[error("Configuration not loaded")]
    NotLoaded,

    /// A configuration layer could not be read
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The resolved configuration does not fit the typed settings view
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn type_mismatch(
        path: &KeyPath,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Type {
            path: path.clone(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn structure(path: &KeyPath, message: impl Into<String>) -> Self {
        Self::Structure {
            path: path.clone(),
            message: message.into(),
        }
    }
}
