//! Field-level validation error types
//!
//! Validation never stops at the first failure: every rule violation found in a
//! document is collected into a [`ValidationErrors`] so callers can report all
//! of them at once.

use serde::Serialize;
use std::fmt;

// ============================================================================
// Validation Errors Collection
// ============================================================================

/// Collection of validation errors for one document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    /// List of individual validation errors, in schema field order
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Create a new empty validation errors collection
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Add a validation error to the collection
    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Errors reported for the given field path
    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.errors.iter().filter(move |e| e.path == path)
    }

    /// Whether any error was reported for the given field path
    pub fn has_path(&self, path: &str) -> bool {
        self.errors.iter().any(|e| e.path == path)
    }

    /// Convert to Result - Ok if no errors, Err if there are errors
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ============================================================================
// Single Validation Error
// ============================================================================

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Dotted field path (e.g. "age", "contacts.tel")
    pub path: String,

    /// Human-readable error message
    pub message: String,

    /// Error type classification
    pub error_type: ErrorType,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(path: impl Into<String>, message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            error_type,
        }
    }

    /// Create a missing field error
    pub fn missing(path: impl Into<String>, message: Option<&str>) -> Self {
        let path = path.into();
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Path `{}` is required", path));
        Self::new(path, message, ErrorType::Missing)
    }

    /// Create a type error
    pub fn type_error(path: impl Into<String>, expected: &str, actual: &str) -> Self {
        let path = path.into();
        let message = format!("Expected {} for `{}`, got {}", expected, path, actual);
        Self::new(path, message, ErrorType::TypeError)
    }

    /// Create a value error (e.g. enum membership)
    pub fn value_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, ErrorType::ValueError)
    }

    /// Create an error reported by a custom validator
    pub fn validator(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, ErrorType::ValidatorFailed)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.path, self.message, self.error_type)
    }
}

// ============================================================================
// Error Type Classification
// ============================================================================

/// Classification of validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Required field missing or empty
    Missing,

    /// Type mismatch (e.g. expected number, got string)
    TypeError,

    /// Value outside the allowed set (e.g. not an enum member)
    ValueError,

    /// A custom validator rejected the value
    ValidatorFailed,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::TypeError => write!(f, "type_error"),
            Self::ValueError => write!(f, "value_error"),
            Self::ValidatorFailed => write!(f, "validator_failed"),
        }
    }
}
