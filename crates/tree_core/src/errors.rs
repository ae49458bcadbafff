//! Error types for tree models

use thiserror::Error;

/// Errors raised while validating, serializing or loading a tree model
#[derive(Error, Debug)]
pub enum ModelError {
    /// Tree structure is inconsistent
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Feature row does not match the model's feature layout
    #[error("Feature mismatch: expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
}
