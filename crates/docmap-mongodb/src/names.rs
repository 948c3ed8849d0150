//! Collection and field name validation
//!
//! Names come from caller-supplied schema configuration and end up as
//! collection names and document keys in the store, so they are checked
//! once when a schema is built or registered.

use crate::{DocMapError, Result};

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Validated collection name
///
/// # Guarantees
/// - Not empty
/// - Maximum 120 characters
/// - No null bytes
/// - No "system." prefix (system collections)
/// - No $ characters (special operators)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(DocMapError::Schema(
                "Collection name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return Err(DocMapError::Schema(format!(
                "Collection name exceeds maximum length of {} characters: '{}'",
                MAX_COLLECTION_NAME_LENGTH, name
            )));
        }

        if name.contains('\0') {
            return Err(DocMapError::Schema(
                "Collection name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with("system.") {
            return Err(DocMapError::Schema(format!(
                "Collection name cannot start with 'system.' (reserved): '{}'",
                name
            )));
        }

        if name.contains('$') {
            return Err(DocMapError::Schema(format!(
                "Collection name cannot contain '$' character: '{}'",
                name
            )));
        }

        if name.contains("..") || name.contains("//") {
            tracing::warn!("Collection name contains suspicious pattern: '{}'", name);
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    /// Default collection name for a kind: lowercased and pluralised
    /// ("Person" -> "people", "Story" -> "stories", "User" -> "users")
    pub fn for_kind(kind: &str) -> Result<Self> {
        Self::new(&pluralize(&kind.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn pluralize(word: &str) -> String {
    const IRREGULAR: &[(&str, &str)] = &[
        ("person", "people"),
        ("child", "children"),
        ("man", "men"),
        ("woman", "women"),
        ("mouse", "mice"),
    ];

    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
        return plural.to_string();
    }
    if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh") {
        if word.ends_with("ss") || !word.ends_with('s') {
            return format!("{}es", word);
        }
        return word.to_string();
    }
    let mut chars = word.chars().rev();
    if let (Some('y'), Some(prev)) = (chars.next(), chars.next()) {
        if !"aeiou".contains(prev) {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    format!("{}s", word)
}

/// Check a schema field name
///
/// Field names are single path segments: dotted paths are built from nested
/// definitions, so '.' is rejected along with the '$' operator prefix.
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DocMapError::Schema("Field name cannot be empty".to_string()));
    }

    if name.len() > MAX_FIELD_NAME_LENGTH {
        return Err(DocMapError::Schema(format!(
            "Field name exceeds maximum length of {} characters",
            MAX_FIELD_NAME_LENGTH
        )));
    }

    if name.contains('\0') {
        return Err(DocMapError::Schema(
            "Field name cannot contain null bytes".to_string(),
        ));
    }

    if name.starts_with('$') {
        return Err(DocMapError::Schema(format!(
            "Field name cannot start with '$' (reserved for operators): '{}'",
            name
        )));
    }

    if name.contains('.') {
        return Err(DocMapError::Schema(format!(
            "Field name cannot contain '.', declare a nested field instead: '{}'",
            name
        )));
    }

    Ok(())
}
