//! Document validation against a schema
//!
//! [`validate`] walks every field definition and collects all failures rather
//! than stopping at the first one. [`prepare_for_write`] normalises caller
//! input (aliases, strict mode, defaults, minimize) before validation runs.

use crate::schema::{join_path, FieldDefinition, FieldType, Schema};
use crate::value::{bson_type_name, is_empty_value, retain_fields};
use crate::{DocMapError, Result};
use bson::{Bson, Document as BsonDocument};
use docmap_common::{ValidationError, ValidationErrors};
use regex::Regex;

// ============================================================================
// Field Validators
// ============================================================================

/// Custom rule attached to a field
///
/// Validators only see values that are present and already type-conformant.
pub trait FieldValidator: Send + Sync {
    /// Check the value, returning the failure message on rejection
    fn validate(&self, value: &Bson) -> std::result::Result<(), String>;

    /// Short description for debug output
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// Substitute `{VALUE}` in a message template
fn render_message(template: &str, value: &Bson) -> String {
    let rendered = match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    };
    template.replace("{VALUE}", &rendered)
}

/// Validator built from a predicate and a message template
pub struct FnFieldValidator<F>
where
    F: Fn(&Bson) -> bool + Send + Sync,
{
    predicate: F,
    message: String,
}

impl<F> FnFieldValidator<F>
where
    F: Fn(&Bson) -> bool + Send + Sync,
{
    /// `message` may contain `{VALUE}`
    pub fn new(predicate: F, message: impl Into<String>) -> Self {
        Self {
            predicate,
            message: message.into(),
        }
    }
}

impl<F> FieldValidator for FnFieldValidator<F>
where
    F: Fn(&Bson) -> bool + Send + Sync,
{
    fn validate(&self, value: &Bson) -> std::result::Result<(), String> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            Err(render_message(&self.message, value))
        }
    }
}

/// String pattern validator (unanchored, like `RegExp.test`)
#[derive(Debug, Clone)]
pub struct RegexValidator {
    pattern: Regex,
    message: String,
}

impl RegexValidator {
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| DocMapError::Schema(format!("Invalid validator pattern: {}", e)))?;
        Ok(Self {
            pattern,
            message: message.into(),
        })
    }
}

impl FieldValidator for RegexValidator {
    fn validate(&self, value: &Bson) -> std::result::Result<(), String> {
        let matched = match value {
            Bson::String(s) => self.pattern.is_match(s),
            other => self.pattern.is_match(&other.to_string()),
        };
        if matched {
            Ok(())
        } else {
            Err(render_message(&self.message, value))
        }
    }

    fn describe(&self) -> String {
        format!("regex({})", self.pattern.as_str())
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a document, returning every field-level failure (empty = valid)
pub fn validate(schema: &Schema, doc: &BsonDocument) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    validate_fields(schema.fields(), doc, "", &mut errors);
    errors
}

fn validate_fields(
    fields: &[FieldDefinition],
    doc: &BsonDocument,
    prefix: &str,
    errors: &mut ValidationErrors,
) {
    for field in fields {
        let path = join_path(prefix, &field.name);
        let value = doc.get(&field.name);

        if let FieldType::Nested(children) = &field.field_type {
            match value {
                Some(Bson::Document(inner)) => validate_fields(children, inner, &path, errors),
                None | Some(Bson::Null) => {
                    if field.required {
                        errors.add(ValidationError::missing(&path, field.required_message.as_deref()));
                    }
                    // Required children are reported even when the parent is absent
                    validate_fields(children, &BsonDocument::new(), &path, errors);
                }
                Some(other) => {
                    errors.add(ValidationError::type_error(&path, "object", bson_type_name(other)))
                }
            }
            continue;
        }

        let value = match value {
            Some(v) if !matches!(v, Bson::Null | Bson::Undefined) => v,
            _ => {
                if field.required {
                    errors.add(ValidationError::missing(&path, field.required_message.as_deref()));
                }
                continue;
            }
        };

        if field.required && is_empty_value(value) {
            errors.add(ValidationError::missing(&path, field.required_message.as_deref()));
            continue;
        }

        if let Some(error) = check_type(&field.field_type, value, &path) {
            errors.add(error);
            continue;
        }

        if let Some(validator) = &field.validator {
            if let Err(message) = validator.validate(value) {
                errors.add(ValidationError::validator(&path, message));
            }
        }
    }
}

fn check_type(field_type: &FieldType, value: &Bson, path: &str) -> Option<ValidationError> {
    let actual = bson_type_name(value);
    match (field_type, value) {
        (FieldType::String, Bson::String(_)) => None,
        (FieldType::Number, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => None,
        (FieldType::Boolean, Bson::Boolean(_)) => None,
        (FieldType::Date, Bson::DateTime(_)) => None,
        (FieldType::Enum(values), Bson::String(s)) => {
            if values.iter().any(|v| v == s) {
                None
            } else {
                Some(ValidationError::value_error(
                    path,
                    format!("`{}` is not a valid enum value for path `{}`", s, path),
                ))
            }
        }
        (FieldType::Reference { .. }, Bson::ObjectId(_)) => None,
        (FieldType::ReferenceList { .. }, Bson::Array(items)) => items
            .iter()
            .enumerate()
            .find(|(_, item)| !matches!(item, Bson::ObjectId(_)))
            .map(|(i, item)| {
                ValidationError::type_error(format!("{}.{}", path, i), "objectId", bson_type_name(item))
            }),
        (FieldType::Enum(_), _) => Some(ValidationError::type_error(path, "string", actual)),
        (expected, _) => Some(ValidationError::type_error(path, expected.type_name(), actual)),
    }
}

// ============================================================================
// Write Preparation
// ============================================================================

/// Normalise caller input before validation and storage
///
/// - alias keys are renamed to their field names
/// - undeclared fields are dropped in strict mode
/// - defaults fill missing fields
/// - empty nested objects are removed when `minimize` is on
pub fn prepare_for_write(schema: &Schema, data: &BsonDocument) -> BsonDocument {
    let options = schema.options();
    let system = schema.system_fields();
    let mut doc = data.clone();

    apply_aliases(schema.fields(), &mut doc);
    if options.strict {
        retain_fields(&mut doc, |key, _| system.contains(&key) || schema.field(key).is_some());
        strip_nested_undeclared(schema.fields(), &mut doc);
    }
    apply_defaults(schema.fields(), &mut doc);
    if options.minimize {
        minimize(&mut doc);
    }
    doc
}

fn apply_aliases(fields: &[FieldDefinition], doc: &mut BsonDocument) {
    for field in fields {
        if let Some(alias) = &field.alias {
            if !doc.contains_key(&field.name) {
                if let Some(value) = doc.remove(alias) {
                    doc.insert(field.name.clone(), value);
                }
            }
        }
        if let (FieldType::Nested(children), Some(Bson::Document(inner))) =
            (&field.field_type, doc.get_mut(&field.name))
        {
            apply_aliases(children, inner);
        }
    }
}

fn strip_nested_undeclared(fields: &[FieldDefinition], doc: &mut BsonDocument) {
    for field in fields {
        if let (FieldType::Nested(children), Some(Bson::Document(inner))) =
            (&field.field_type, doc.get_mut(&field.name))
        {
            retain_fields(inner, |key, _| children.iter().any(|c| c.name == key));
            strip_nested_undeclared(children, inner);
        }
    }
}

fn apply_defaults(fields: &[FieldDefinition], doc: &mut BsonDocument) {
    for field in fields {
        if !doc.contains_key(&field.name) {
            if let Some(default) = &field.default {
                doc.insert(field.name.clone(), default.clone());
            }
        }
        if let (FieldType::Nested(children), Some(Bson::Document(inner))) =
            (&field.field_type, doc.get_mut(&field.name))
        {
            apply_defaults(children, inner);
        }
    }
}

fn minimize(doc: &mut BsonDocument) {
    for (_, value) in doc.iter_mut() {
        if let Bson::Document(inner) = value {
            minimize(inner);
        }
    }
    retain_fields(doc, |_, value| !matches!(value, Bson::Document(inner) if inner.is_empty()));
}
