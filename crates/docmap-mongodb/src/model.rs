//! Document store facade
//!
//! [`Odm`] ties the registry, validator, populator and a [`DocumentStore`]
//! together. Every write goes through the same preparation: aliases and
//! strict mode are applied, defaults are filled in, the result is validated,
//! and only then is anything sent to the store.

use crate::aggregate::Pipeline;
use crate::filter::Filter;
use crate::populate::{PopulateOptions, Populator};
use crate::projection::Projection;
use crate::query::Query;
use crate::registry::{Model, SchemaRegistry};
use crate::schema::{FieldDefinition, FieldType, Schema, ID_FIELD};
use crate::store::{id_filter, DocumentStore, FindOptions};
use crate::validation::{prepare_for_write, validate};
use crate::value::{bson_type_name, get_path, remove_path, set_path};
use crate::{DocMapError, Result};
use bson::{oid::ObjectId, Bson, DateTime, Document as BsonDocument};
use docmap_common::{BatchFailure, ValidationError, ValidationErrors};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

// ============================================================================
// ModelDocument
// ============================================================================

/// Detached copy of a stored document
///
/// Changes made with [`set`](ModelDocument::set) and
/// [`remove`](ModelDocument::remove) stay local until the document is passed
/// to [`Odm::save`]. A document loaded through a projection remembers it, so
/// saving never drops the fields that were not loaded.
#[derive(Debug, Clone)]
pub struct ModelDocument {
    model: Arc<Model>,
    data: BsonDocument,
    selection: Option<Projection>,
    changed: Vec<String>,
}

impl ModelDocument {
    pub(crate) fn new(model: Arc<Model>, data: BsonDocument) -> Self {
        Self::loaded(model, data, None)
    }

    pub(crate) fn loaded(model: Arc<Model>, data: BsonDocument, selection: Option<Projection>) -> Self {
        Self {
            model,
            data,
            selection,
            changed: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        self.model.kind()
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.data.get_object_id(ID_FIELD).ok()
    }

    /// Value at a dotted path
    pub fn get(&self, path: &str) -> Option<&Bson> {
        get_path(&self.data, path)
    }

    pub fn set(&mut self, path: &str, value: impl Into<Bson>) {
        set_path(&mut self.data, path, value.into());
        self.mark_changed(path);
    }

    pub fn remove(&mut self, path: &str) -> Option<Bson> {
        self.mark_changed(path);
        remove_path(&mut self.data, path)
    }

    /// Whether only part of the stored document was loaded
    pub fn is_partial(&self) -> bool {
        self.selection.is_some()
    }

    pub fn data(&self) -> &BsonDocument {
        &self.data
    }

    fn mark_changed(&mut self, path: &str) {
        if !self.changed.iter().any(|p| p == path) {
            self.changed.push(path.to_string());
        }
    }

    /// Stored data plus aliases and computed virtual fields
    pub fn with_virtuals(&self) -> BsonDocument {
        self.model.schema().apply_virtuals(&self.data)
    }

    pub fn to_json(&self) -> serde_json::Value {
        Bson::Document(self.with_virtuals()).into_relaxed_extjson()
    }

    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        bson::from_document(self.data.clone())
            .map_err(|e| DocMapError::Deserialization(e.to_string()))
    }
}

impl PartialEq for ModelDocument {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.data == other.data
    }
}

// ============================================================================
// Odm
// ============================================================================

/// Schema-aware facade over a document store
pub struct Odm {
    registry: SchemaRegistry,
    store: Arc<dyn DocumentStore>,
}

impl Odm {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            registry: SchemaRegistry::new(),
            store,
        }
    }

    pub fn with_store(store: impl DocumentStore) -> Self {
        Self::new(Arc::new(store))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn register(&self, kind: &str, schema: Schema) -> Result<Arc<Model>> {
        let model = self.registry.register(kind, schema)?;
        info!(kind, collection = model.collection(), backend = self.store.backend(), "Model registered");
        Ok(model)
    }

    pub fn model(&self, kind: &str) -> Result<Arc<Model>> {
        self.registry.get(kind)
    }

    /// Create every field-level and composite index declared by the schema
    pub async fn ensure_indexes(&self, kind: &str) -> Result<()> {
        let model = self.model(kind)?;
        let specs = model.schema().index_specs();
        debug!(kind, indexes = specs.len(), "Ensuring indexes");
        self.store.ensure_indexes(model.collection(), &specs).await
    }

    /// Validate without writing, after the same normalisation a write applies
    pub fn validate(&self, kind: &str, data: &BsonDocument) -> Result<()> {
        let model = self.model(kind)?;
        let prepared = prepare_for_write(model.schema(), data);
        validate(model.schema(), &prepared).into_result()?;
        Ok(())
    }

    /// Validate, assign an identity and persist one document
    #[instrument(skip(self, data))]
    pub async fn insert(&self, kind: &str, data: BsonDocument) -> Result<ModelDocument> {
        let model = self.model(kind)?;
        let doc = prepare_insert(model.schema(), &data)?;
        self.store.insert_one(model.collection(), doc.clone()).await?;
        debug!(id = ?doc.get_object_id(ID_FIELD).ok(), "Inserted document");
        Ok(ModelDocument::new(model, doc))
    }

    /// Serialise any value with `bson` and insert it
    pub async fn insert_typed<T: Serialize + Sync>(&self, kind: &str, value: &T) -> Result<ModelDocument> {
        let data = bson::to_document(value).map_err(|e| DocMapError::Serialization(e.to_string()))?;
        self.insert(kind, data).await
    }

    /// Insert a batch with all-or-nothing validation
    ///
    /// If any item fails validation nothing is written and the error names
    /// every failing index. Otherwise the writes are issued concurrently and
    /// all of them are awaited before returning.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn insert_many(&self, kind: &str, items: Vec<BsonDocument>) -> Result<Vec<ModelDocument>> {
        let model = self.model(kind)?;

        let mut prepared = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        for (index, data) in items.iter().enumerate() {
            match prepare_insert(model.schema(), data) {
                Ok(doc) => prepared.push(doc),
                Err(DocMapError::Validation(errors)) => failures.push(BatchFailure { index, errors }),
                Err(other) => return Err(other),
            }
        }
        if !failures.is_empty() {
            return Err(DocMapError::BatchValidation { failures });
        }

        self.store
            .insert_many(model.collection(), prepared.clone())
            .await?;
        debug!(inserted = prepared.len(), "Inserted batch");
        Ok(prepared
            .into_iter()
            .map(|doc| ModelDocument::new(Arc::clone(&model), doc))
            .collect())
    }

    /// Chainable query over one kind
    pub fn query(&self, kind: &str) -> Query<'_> {
        Query::new(self, kind)
    }

    pub async fn find(
        &self,
        kind: &str,
        filter: Filter,
        projection: Option<Projection>,
    ) -> Result<Vec<ModelDocument>> {
        let mut query = self.query(kind).filter(filter);
        if let Some(projection) = projection {
            query = query.select(projection);
        }
        query.exec().await
    }

    pub async fn find_one(&self, kind: &str, filter: Filter) -> Result<Option<ModelDocument>> {
        self.query(kind).filter(filter).exec_one().await
    }

    pub async fn find_by_id(&self, kind: &str, id: ObjectId) -> Result<Option<ModelDocument>> {
        let model = self.model(kind)?;
        let found = self.store.find_one(model.collection(), &id_filter(id)).await?;
        Ok(found.map(|doc| ModelDocument::new(model, doc)))
    }

    pub async fn count(&self, kind: &str, filter: &Filter) -> Result<u64> {
        let model = self.model(kind)?;
        self.store.count(model.collection(), filter).await
    }

    /// Persist local changes to a previously stored document
    ///
    /// The write starts from the stored copy: fields outside the projection
    /// the document was loaded with are kept, and references that were not
    /// changed keep their stored ids even when they were populated. The
    /// result is re-validated (unless the schema disables it), the stored
    /// version key is incremented, the creation timestamp is carried over
    /// and the update timestamp refreshed. Saving a document that no longer
    /// exists fails with `NotFound`.
    #[instrument(skip(self, document), fields(kind = document.kind()))]
    pub async fn save(&self, document: &mut ModelDocument) -> Result<()> {
        let model = Arc::clone(&document.model);
        let schema = model.schema();
        let id = document
            .id()
            .ok_or_else(|| DocMapError::Store("Document has no _id".to_string()))?;
        let not_found = || DocMapError::NotFound {
            kind: model.kind().to_string(),
            id: id.to_hex(),
        };

        let stored = self
            .store
            .find_one(model.collection(), &id_filter(id))
            .await?
            .ok_or_else(not_found)?;

        let mut merged = merge_changes(document, &stored);
        restore_references(schema.fields(), "", &mut merged, &stored, &document.changed);
        let mut data = prepare_for_write(schema, &merged);
        if schema.options().validate_before_save {
            validate(schema, &data).into_result()?;
        }

        let options = schema.options();
        if let Some(key) = &options.version_key {
            let next = next_version(stored.get(key)).ok_or_else(|| DocMapError::VersionOverflow {
                kind: model.kind().to_string(),
                id: id.to_hex(),
                key: key.clone(),
            })?;
            data.insert(key.clone(), next);
        }
        if let Some(ts) = &options.timestamps {
            let now = DateTime::now();
            let created = stored.get(&ts.created_at).cloned().unwrap_or(Bson::DateTime(now));
            data.insert(ts.created_at.clone(), created);
            data.insert(ts.updated_at.clone(), now);
        }

        let matched = self
            .store
            .update_by_id(model.collection(), id, data.clone())
            .await?;
        if !matched {
            return Err(not_found());
        }
        debug!(%id, partial = document.is_partial(), "Saved document");
        document.data = data;
        document.selection = None;
        document.changed.clear();
        Ok(())
    }

    pub async fn delete_by_id(&self, kind: &str, id: ObjectId) -> Result<()> {
        self.find_by_id_and_delete(kind, id)
            .await?
            .map(|_| ())
            .ok_or_else(|| DocMapError::NotFound {
                kind: kind.to_string(),
                id: id.to_hex(),
            })
    }

    /// Remove a document, returning it when it existed
    #[instrument(skip(self))]
    pub async fn find_by_id_and_delete(&self, kind: &str, id: ObjectId) -> Result<Option<ModelDocument>> {
        let model = self.model(kind)?;
        let removed = self.store.delete_by_id(model.collection(), id).await?;
        debug!(removed = removed.is_some(), "Deleted document");
        Ok(removed.map(|doc| ModelDocument::new(model, doc)))
    }

    /// Resolve one reference path across `documents`, in place
    pub async fn populate(
        &self,
        kind: &str,
        documents: &mut [BsonDocument],
        options: &PopulateOptions,
    ) -> Result<()> {
        let model = self.model(kind)?;
        Populator::new(self.store.as_ref(), &self.registry)
            .populate(&model, documents, options)
            .await
    }

    #[instrument(skip(self, pipeline), fields(stages = pipeline.stages().len()))]
    pub async fn aggregate(&self, kind: &str, pipeline: &Pipeline) -> Result<Vec<BsonDocument>> {
        let model = self.model(kind)?;
        self.store.aggregate(model.collection(), pipeline).await
    }

    pub(crate) async fn run_query(
        &self,
        kind: &str,
        filter: &Filter,
        options: &FindOptions,
        populate: &[PopulateOptions],
    ) -> Result<Vec<ModelDocument>> {
        let model = self.model(kind)?;
        let mut docs = self
            .store
            .find_many(model.collection(), filter, options)
            .await?;

        let populator = Populator::new(self.store.as_ref(), &self.registry);
        for options in populate {
            populator.populate(&model, &mut docs, options).await?;
        }

        Ok(docs
            .into_iter()
            .map(|doc| ModelDocument::loaded(Arc::clone(&model), doc, options.projection.clone()))
            .collect())
    }
}

/// Normalise, validate and stamp a new document
fn prepare_insert(schema: &Schema, data: &BsonDocument) -> Result<BsonDocument> {
    let prepared = prepare_for_write(schema, data);
    let mut errors: ValidationErrors = validate(schema, &prepared);
    let id = match prepared.get(ID_FIELD) {
        Some(Bson::ObjectId(id)) => *id,
        Some(other) => {
            errors.add(ValidationError::type_error(ID_FIELD, "objectId", bson_type_name(other)));
            ObjectId::new()
        }
        None => ObjectId::new(),
    };
    errors.into_result()?;

    // Identity first, then data, then bookkeeping fields
    let mut doc = BsonDocument::new();
    doc.insert(ID_FIELD, id);
    for (key, value) in prepared {
        if key != ID_FIELD {
            doc.insert(key, value);
        }
    }

    let options = schema.options();
    if let Some(ts) = &options.timestamps {
        let now = DateTime::now();
        doc.insert(ts.created_at.clone(), now);
        doc.insert(ts.updated_at.clone(), now);
    }
    if let Some(key) = &options.version_key {
        if !doc.contains_key(key) {
            doc.insert(key.clone(), 0_i32);
        }
    }
    Ok(doc)
}

/// Stored document overlaid with the local copy
///
/// A fully loaded document replaces the stored one. A projected one only
/// contributes the paths it loaded. Paths changed with `set` or `remove`
/// always win.
fn merge_changes(document: &ModelDocument, stored: &BsonDocument) -> BsonDocument {
    let local = &document.data;
    let mut merged = match &document.selection {
        None => local.clone(),
        Some(Projection::Include { fields, .. }) => {
            let mut merged = stored.clone();
            for path in fields {
                if let Some(value) = get_path(local, path) {
                    set_path(&mut merged, path, value.clone());
                }
            }
            merged
        }
        Some(Projection::Exclude(fields)) => {
            let mut merged = local.clone();
            for path in fields {
                if let Some(value) = get_path(stored, path) {
                    set_path(&mut merged, path, value.clone());
                }
            }
            merged
        }
    };

    for path in &document.changed {
        match get_path(local, path) {
            Some(value) => set_path(&mut merged, path, value.clone()),
            None => {
                remove_path(&mut merged, path);
            }
        }
    }
    merged
}

/// Put stored ids back into reference fields
///
/// Unchanged references are copied from the stored document even when they
/// were populated, filtered by a populate `match` or selected without `_id`.
/// Changed references that hold populated documents are reduced to their ids.
fn restore_references(
    fields: &[FieldDefinition],
    prefix: &str,
    merged: &mut BsonDocument,
    stored: &BsonDocument,
    changed: &[String],
) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };
        match &field.field_type {
            FieldType::Reference { .. } | FieldType::ReferenceList { .. } => {
                if touches(changed, &path) {
                    if let Some(ids) = get_path(merged, &path).and_then(reference_ids) {
                        set_path(merged, &path, ids);
                    }
                } else if let Some(original) = get_path(stored, &path) {
                    set_path(merged, &path, original.clone());
                } else {
                    remove_path(merged, &path);
                }
            }
            FieldType::Nested(children) => {
                restore_references(children, &path, merged, stored, changed)
            }
            _ => {}
        }
    }
}

fn touches(changed: &[String], path: &str) -> bool {
    changed.iter().any(|c| {
        c == path
            || c.strip_prefix(path).is_some_and(|rest| rest.starts_with('.'))
            || path.strip_prefix(c.as_str()).is_some_and(|rest| rest.starts_with('.'))
    })
}

// None when a populated document carries no ObjectId `_id`.
fn reference_ids(value: &Bson) -> Option<Bson> {
    fn to_id(value: &Bson) -> Option<Bson> {
        match value {
            Bson::Document(inner) => inner.get_object_id(ID_FIELD).ok().map(Bson::ObjectId),
            other => Some(other.clone()),
        }
    }

    match value {
        Bson::Array(items) => items
            .iter()
            .map(to_id)
            .collect::<Option<Vec<_>>>()
            .map(Bson::Array),
        other => to_id(other),
    }
}

/// Stored version plus one; Int32 widens to Int64 instead of wrapping
fn next_version(current: Option<&Bson>) -> Option<Bson> {
    match current {
        Some(Bson::Int32(n)) => Some(
            n.checked_add(1)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(i64::from(*n) + 1)),
        ),
        Some(Bson::Int64(n)) => n.checked_add(1).map(Bson::Int64),
        _ => Some(Bson::Int32(1)),
    }
}
