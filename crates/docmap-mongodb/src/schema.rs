//! Schema definitions
//!
//! A [`Schema`] is the declarative description of one kind: an ordered list of
//! field definitions, virtual fields and entity-level options (collection
//! name, indexes, strictness, timestamps, version key).
//!
//! # Example
//!
//! ```rust,ignore
//! use docmap_mongodb::schema::{FieldDefinition, Schema};
//!
//! let person = Schema::builder()
//!     .field(FieldDefinition::string("name"))
//!     .field(FieldDefinition::number("age").index())
//!     .field(FieldDefinition::enumeration("gender", ["male", "female", "middle"]))
//!     .field(FieldDefinition::references("friends", "Person"))
//!     .virtual_field("is_old", |doc| ...)
//!     .build()?;
//! ```

use crate::names::validate_field_name;
use crate::sort::SortDirection;
use crate::validation::FieldValidator;
use crate::{DocMapError, Result};
use bson::{Bson, Document as BsonDocument};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Key under which every stored document carries its identity
pub const ID_FIELD: &str = "_id";

// ============================================================================
// Field Types
// ============================================================================

/// Semantic type of a field
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    /// Any BSON number (int, long or double)
    Number,
    Boolean,
    Date,
    /// String restricted to the listed values
    Enum(Vec<String>),
    /// Single identity pointing at a document of `kind`
    Reference { kind: String },
    /// Sequence of identities pointing at documents of `kind`
    ReferenceList { kind: String },
    /// Sub-document with its own ordered fields
    Nested(Vec<FieldDefinition>),
}

impl FieldType {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Enum(_) => "enum",
            FieldType::Reference { .. } => "objectId",
            FieldType::ReferenceList { .. } => "array of objectId",
            FieldType::Nested(_) => "object",
        }
    }

    /// Target kind for reference types
    pub fn reference_kind(&self) -> Option<&str> {
        match self {
            FieldType::Reference { kind } | FieldType::ReferenceList { kind } => Some(kind.as_str()),
            _ => None,
        }
    }
}

// ============================================================================
// Field Definition
// ============================================================================

/// One field of a schema
#[derive(Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Message reported instead of the default when a required field is missing
    pub required_message: Option<String>,
    pub validator: Option<Arc<dyn FieldValidator>>,
    pub default: Option<Bson>,
    /// Field-level single key index
    pub index: bool,
    /// Alternate input key stored under `name`
    pub alias: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            required_message: None,
            validator: None,
            default: None,
            index: false,
            alias: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, FieldType::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn reference(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(name, FieldType::Reference { kind: kind.into() })
    }

    pub fn references(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(name, FieldType::ReferenceList { kind: kind.into() })
    }

    pub fn nested(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self::new(name, FieldType::Nested(fields))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn required_with(mut self, message: impl Into<String>) -> Self {
        self.required = true;
        self.required_message = Some(message.into());
        self
    }

    pub fn validate(mut self, validator: impl FieldValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("required", &self.required)
            .field("validator", &self.validator.as_ref().map(|v| v.describe()))
            .field("default", &self.default)
            .field("index", &self.index)
            .field("alias", &self.alias)
            .finish()
    }
}

// ============================================================================
// Virtual Fields
// ============================================================================

type VirtualFn = dyn Fn(&BsonDocument) -> Bson + Send + Sync;

/// Field derived from stored data at read time, never persisted
#[derive(Clone)]
pub struct VirtualField {
    name: String,
    compute: Arc<VirtualFn>,
}

impl VirtualField {
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&BsonDocument) -> Bson + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compute: Arc::new(compute),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compute(&self, doc: &BsonDocument) -> Bson {
        (self.compute)(doc)
    }
}

impl fmt::Debug for VirtualField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualField").field("name", &self.name).finish()
    }
}

// ============================================================================
// Options
// ============================================================================

/// Index over one or more keys
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Vec<(String, SortDirection)>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            unique: false,
        }
    }

    pub fn key(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Key document in MongoDB form (`{ name: 1, age: -1 }`)
    pub fn key_document(&self) -> BsonDocument {
        let mut doc = BsonDocument::new();
        for (field, direction) in &self.keys {
            doc.insert(field.clone(), direction.as_i32());
        }
        doc
    }
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of automatically maintained timestamp fields
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampOptions {
    pub created_at: String,
    pub updated_at: String,
}

impl Default for TimestampOptions {
    fn default() -> Self {
        Self {
            created_at: "createdAt".to_string(),
            updated_at: "updatedAt".to_string(),
        }
    }
}

/// Entity-level schema options
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    /// Custom collection name; defaults to the pluralised kind name
    pub collection: Option<String>,
    /// Composite indexes
    pub indexes: Vec<IndexSpec>,
    /// Drop undeclared fields on write
    pub strict: bool,
    pub timestamps: Option<TimestampOptions>,
    /// Field holding the save counter; `None` disables versioning
    pub version_key: Option<String>,
    pub validate_before_save: bool,
    /// Drop empty nested objects before storing
    pub minimize: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            collection: None,
            indexes: Vec::new(),
            strict: true,
            timestamps: None,
            version_key: Some("__v".to_string()),
            validate_before_save: true,
            minimize: true,
        }
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Immutable description of one kind
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldDefinition>,
    virtuals: Vec<VirtualField>,
    options: SchemaOptions,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Top-level fields in declaration order
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by dotted path through nested definitions
    pub fn field_by_path(&self, path: &str) -> Option<&FieldDefinition> {
        let mut segments = path.split('.');
        let mut current = self.field(segments.next()?)?;
        for segment in segments {
            match &current.field_type {
                FieldType::Nested(children) => {
                    current = children.iter().find(|f| f.name == segment)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn virtuals(&self) -> &[VirtualField] {
        &self.virtuals
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Names that are always allowed in stored documents besides declared fields
    pub fn system_fields(&self) -> Vec<&str> {
        let mut names = vec![ID_FIELD];
        if let Some(key) = &self.options.version_key {
            names.push(key);
        }
        if let Some(ts) = &self.options.timestamps {
            names.push(&ts.created_at);
            names.push(&ts.updated_at);
        }
        names
    }

    /// Every index: field-level flags first (including nested paths), then composites
    pub fn index_specs(&self) -> Vec<IndexSpec> {
        let mut specs = Vec::new();
        collect_field_indexes(&self.fields, "", &mut specs);
        specs.extend(self.options.indexes.iter().cloned());
        specs
    }

    /// Copy of `doc` with every virtual field computed and top-level aliases exposed
    pub fn apply_virtuals(&self, doc: &BsonDocument) -> BsonDocument {
        let mut out = doc.clone();
        for field in &self.fields {
            if let (Some(alias), Some(value)) = (&field.alias, doc.get(&field.name)) {
                out.insert(alias.clone(), value.clone());
            }
        }
        for virtual_field in &self.virtuals {
            out.insert(virtual_field.name.clone(), virtual_field.compute(doc));
        }
        out
    }
}

fn collect_field_indexes(fields: &[FieldDefinition], prefix: &str, out: &mut Vec<IndexSpec>) {
    for field in fields {
        let path = join_path(prefix, &field.name);
        if field.index {
            out.push(IndexSpec::new().key(path.clone(), SortDirection::Ascending));
        }
        if let FieldType::Nested(children) = &field.field_type {
            collect_field_indexes(children, &path, out);
        }
    }
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Builder enforcing field name uniqueness
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDefinition>,
    virtuals: Vec<VirtualField>,
    options: SchemaOptions,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn virtual_field<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&BsonDocument) -> Bson + Send + Sync + 'static,
    {
        self.virtuals.push(VirtualField::new(name, compute));
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.options.collection = Some(name.into());
        self
    }

    /// Composite index
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.options.indexes.push(index);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn timestamps(mut self, timestamps: TimestampOptions) -> Self {
        self.options.timestamps = Some(timestamps);
        self
    }

    pub fn version_key(mut self, key: Option<&str>) -> Self {
        self.options.version_key = key.map(str::to_string);
        self
    }

    pub fn validate_before_save(mut self, enabled: bool) -> Self {
        self.options.validate_before_save = enabled;
        self
    }

    pub fn minimize(mut self, enabled: bool) -> Self {
        self.options.minimize = enabled;
        self
    }

    pub fn options(mut self, options: SchemaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Schema> {
        check_fields(&self.fields, "")?;

        let mut declared: HashSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        for virtual_field in &self.virtuals {
            validate_field_name(&virtual_field.name)?;
            if !declared.insert(&virtual_field.name) {
                return Err(DocMapError::Schema(format!(
                    "Virtual field '{}' collides with another field",
                    virtual_field.name
                )));
            }
        }

        for index in &self.options.indexes {
            if index.keys.is_empty() {
                return Err(DocMapError::Schema("Index must name at least one key".to_string()));
            }
        }

        Ok(Schema {
            fields: self.fields,
            virtuals: self.virtuals,
            options: self.options,
        })
    }
}

fn check_fields(fields: &[FieldDefinition], prefix: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        validate_field_name(&field.name)?;
        if !seen.insert(field.name.as_str()) {
            return Err(DocMapError::Schema(format!(
                "Duplicate field '{}'",
                join_path(prefix, &field.name)
            )));
        }
        if let Some(alias) = &field.alias {
            validate_field_name(alias)?;
            if !seen.insert(alias.as_str()) {
                return Err(DocMapError::Schema(format!(
                    "Alias '{}' collides with another field",
                    join_path(prefix, alias)
                )));
            }
        }
        if let FieldType::Enum(values) = &field.field_type {
            if values.is_empty() {
                return Err(DocMapError::Schema(format!(
                    "Enum field '{}' declares no values",
                    join_path(prefix, &field.name)
                )));
            }
        }
        if let FieldType::Nested(children) = &field.field_type {
            check_fields(children, &join_path(prefix, &field.name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn person_schema() -> Schema {
        Schema::builder()
            .field(FieldDefinition::string("name"))
            .field(FieldDefinition::number("age").index())
            .field(FieldDefinition::enumeration("gender", ["male", "female", "middle"]))
            .field(FieldDefinition::references("friends", "Person"))
            .field(FieldDefinition::nested(
                "contacts",
                vec![
                    FieldDefinition::string("wx"),
                    FieldDefinition::string("tel").required().index(),
                ],
            ))
            .index(
                IndexSpec::new()
                    .key("name", SortDirection::Ascending)
                    .key("age", SortDirection::Descending),
            )
            .virtual_field("is_old", |doc| {
                Bson::Boolean(doc.get("age").and_then(crate::value::as_f64).unwrap_or(0.0) > 18.0)
            })
            .collection("customedShare")
            .build()
            .unwrap()
    }

    #[test]
    fn test_fields_keep_declaration_order() {
        let schema = person_schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age", "gender", "friends", "contacts"]);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = Schema::builder()
            .field(FieldDefinition::string("name"))
            .field(FieldDefinition::number("name"))
            .build();
        assert!(result.unwrap_err().to_string().contains("Duplicate field 'name'"));
    }

    #[test]
    fn test_duplicate_nested_field_rejected() {
        let result = Schema::builder()
            .field(FieldDefinition::nested(
                "contacts",
                vec![FieldDefinition::string("tel"), FieldDefinition::string("tel")],
            ))
            .build();
        assert!(result.unwrap_err().to_string().contains("contacts.tel"));
    }

    #[test]
    fn test_alias_collision_rejected() {
        let result = Schema::builder()
            .field(FieldDefinition::string("t").alias("title"))
            .field(FieldDefinition::string("title"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_field_by_path() {
        let schema = person_schema();
        assert!(schema.field_by_path("contacts.tel").unwrap().required);
        assert!(schema.field_by_path("contacts.fax").is_none());
        assert!(schema.field_by_path("name.first").is_none());
    }

    #[test]
    fn test_index_specs() {
        let schema = person_schema();
        let specs = schema.index_specs();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].key_document(), doc! { "age": 1 });
        assert_eq!(specs[1].key_document(), doc! { "contacts.tel": 1 });
        assert_eq!(specs[2].key_document(), doc! { "name": 1, "age": -1 });
    }

    #[test]
    fn test_virtuals_are_computed_not_stored() {
        let schema = person_schema();
        let stored = doc! { "name": "Amy", "age": 17 };
        let view = schema.apply_virtuals(&stored);
        assert_eq!(view.get_bool("is_old").unwrap(), false);
        assert!(stored.get("is_old").is_none());
    }

    #[test]
    fn test_default_options() {
        let schema = Schema::builder().build().unwrap();
        assert!(schema.options().strict);
        assert!(schema.options().validate_before_save);
        assert_eq!(schema.options().version_key.as_deref(), Some("__v"));
        assert_eq!(schema.system_fields(), vec!["_id", "__v"]);
    }

    #[test]
    fn test_empty_enum_rejected() {
        let result = Schema::builder()
            .field(FieldDefinition::enumeration("gender", Vec::<String>::new()))
            .build();
        assert!(result.is_err());
    }
}
