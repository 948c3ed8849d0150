//! Schema registry keyed by kind name

use crate::names::ValidatedCollectionName;
use crate::schema::Schema;
use crate::{DocMapError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registered kind: its schema and resolved collection name
#[derive(Debug, Clone)]
pub struct Model {
    kind: String,
    collection: ValidatedCollectionName,
    schema: Arc<Schema>,
}

impl Model {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn collection(&self) -> &str {
        self.collection.as_str()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Registered schemas are immutable; re-registering a kind is an error.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    models: RwLock<HashMap<String, Arc<Model>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: &str, schema: Schema) -> Result<Arc<Model>> {
        if kind.trim().is_empty() {
            return Err(DocMapError::Schema("Kind name cannot be empty".to_string()));
        }

        let collection = match &schema.options().collection {
            Some(name) => ValidatedCollectionName::new(name)?,
            None => ValidatedCollectionName::for_kind(kind)?,
        };

        let mut models = self.models.write();
        if models.contains_key(kind) {
            return Err(DocMapError::DuplicateKind(kind.to_string()));
        }
        if let Some(existing) = models.values().find(|m| m.collection == collection) {
            return Err(DocMapError::Schema(format!(
                "Collection '{}' is already used by kind '{}'",
                collection, existing.kind
            )));
        }

        let model = Arc::new(Model {
            kind: kind.to_string(),
            collection,
            schema: Arc::new(schema),
        });
        models.insert(kind.to_string(), Arc::clone(&model));
        debug!(kind, collection = model.collection(), "Registered kind");
        Ok(model)
    }

    pub fn get(&self, kind: &str) -> Result<Arc<Model>> {
        self.models
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| DocMapError::UnknownKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.models.read().contains_key(kind)
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.models.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefinition;

    fn person_schema() -> Schema {
        Schema::builder()
            .field(FieldDefinition::string("name"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = SchemaRegistry::new();
        registry.register("Person", person_schema()).unwrap();

        let model = registry.get("Person").unwrap();
        assert_eq!(model.kind(), "Person");
        assert_eq!(model.collection(), "people");
        assert!(model.schema().field("name").is_some());
    }

    #[test]
    fn test_duplicate_kind() {
        let registry = SchemaRegistry::new();
        registry.register("Person", person_schema()).unwrap();
        let err = registry.register("Person", person_schema()).unwrap_err();
        assert!(matches!(err, DocMapError::DuplicateKind(ref k) if k == "Person"));
    }

    #[test]
    fn test_unknown_kind() {
        let registry = SchemaRegistry::new();
        let err = registry.get("Story").unwrap_err();
        assert!(matches!(err, DocMapError::UnknownKind(ref k) if k == "Story"));
    }

    #[test]
    fn test_custom_collection() {
        let registry = SchemaRegistry::new();
        let schema = Schema::builder()
            .field(FieldDefinition::string("name"))
            .collection("customedShare")
            .build()
            .unwrap();
        let model = registry.register("Person", schema).unwrap();
        assert_eq!(model.collection(), "customedShare");
    }

    #[test]
    fn test_invalid_collection_rejected() {
        let registry = SchemaRegistry::new();
        let schema = Schema::builder().collection("system.users").build().unwrap();
        assert!(registry.register("Person", schema).is_err());
        assert!(!registry.contains("Person"));
    }

    #[test]
    fn test_collection_clash() {
        let registry = SchemaRegistry::new();
        registry.register("Person", person_schema()).unwrap();
        let schema = Schema::builder().collection("people").build().unwrap();
        assert!(matches!(
            registry.register("Human", schema),
            Err(DocMapError::Schema(_))
        ));
        assert_eq!(registry.kinds(), vec!["Person".to_string()]);
    }
}
