//! Errors surfaced by the document store.

use thiserror::Error;

/// Failure raised while talking to a collection.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A value could not be converted to the declared kind of its field.
    #[error("cast to {kind} failed for value \"{value}\" at path \"{path}\"")]
    Cast {
        path: String,
        value: String,
        kind: &'static str,
    },

    #[error("duplicate key on {field}: \"{value}\"")]
    DuplicateKey { field: String, value: String },

    #[error("unknown field \"{0}\"")]
    UnknownField(String),

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("unsupported connection scheme \"{0}\"; expected mem:// or file://")]
    UnsupportedScheme(String),

    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
}
