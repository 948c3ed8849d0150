//! Common utilities for docmap
//!
//! This crate provides the error surface shared by the mapping core and the CLI.

pub mod error;
pub mod validation;

pub use error::{BatchFailure, DocMapError, Result};
pub use validation::{ErrorType, ValidationError, ValidationErrors};
