//! Error types for docmap

use crate::validation::ValidationErrors;
use thiserror::Error;

/// Result type alias for docmap operations
pub type Result<T> = std::result::Result<T, DocMapError>;

/// A single rejected item in a batch insert
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// Position of the item in the submitted batch
    pub index: usize,
    /// Every validation error reported for the item
    pub errors: ValidationErrors,
}

/// Unified error type for all docmap operations
#[derive(Error, Debug, Clone)]
pub enum DocMapError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Kind already registered: {0}")]
    DuplicateKind(String),

    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    #[error("Document not found: {kind} {id}")]
    NotFound { kind: String, id: String },

    #[error("Version key {key} overflowed: {kind} {id}")]
    VersionOverflow { kind: String, id: String, key: String },

    #[error("Batch validation failed at indices {:?}", failing_indices(.failures))]
    BatchValidation { failures: Vec<BatchFailure> },

    #[error("Batch write failed at indices {failed:?}: {message}")]
    BatchWrite { failed: Vec<usize>, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

fn failing_indices(failures: &[BatchFailure]) -> Vec<usize> {
    failures.iter().map(|f| f.index).collect()
}

impl DocMapError {
    /// Returns true if the caller can correct its input and retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DocMapError::Validation(_)
                | DocMapError::NotFound { .. }
                | DocMapError::BatchValidation { .. }
        )
    }

    /// Returns true if this is a missing-document error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocMapError::NotFound { .. })
    }

    /// Indices named by a batch error, empty for every other variant
    pub fn batch_indices(&self) -> Vec<usize> {
        match self {
            DocMapError::BatchValidation { failures } => failing_indices(failures),
            DocMapError::BatchWrite { failed, .. } => failed.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<ValidationErrors> for DocMapError {
    fn from(errors: ValidationErrors) -> Self {
        DocMapError::Validation(errors)
    }
}

impl From<serde_json::Error> for DocMapError {
    fn from(err: serde_json::Error) -> Self {
        DocMapError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for DocMapError {
    fn from(err: mongodb::error::Error) -> Self {
        DocMapError::Store(err.to_string())
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for DocMapError {
    fn from(err: bson::ser::Error) -> Self {
        DocMapError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for DocMapError {
    fn from(err: bson::de::Error) -> Self {
        DocMapError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}
