//! Reference population
//!
//! Replaces reference ids with the documents they point to. Each populate
//! call resolves one path for a whole batch of documents with a single `$in`
//! query against the target kind. Resolution is best effort: a single
//! reference with no match becomes `null`, and unmatched entries of a
//! reference array are left out. A missing target never fails the batch.

use crate::filter::Filter;
use crate::projection::Projection;
use crate::registry::{Model, SchemaRegistry};
use crate::schema::ID_FIELD;
use crate::sort::SortSpec;
use crate::store::{DocumentStore, FindOptions};
use crate::value::{get_path, set_path};
use crate::{DocMapError, Result};
use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// What to resolve and how to shape the resolved documents
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateOptions {
    /// Reference field, dotted for nested fields
    pub path: String,
    /// Target kind; defaults to the kind named by the field definition
    pub model: Option<String>,
    pub select: Option<Projection>,
    pub match_filter: Option<Filter>,
    pub sort: Option<SortSpec>,
}

impl PopulateOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            model: None,
            select: None,
            match_filter: None,
            sort: None,
        }
    }

    pub fn model(mut self, kind: impl Into<String>) -> Self {
        self.model = Some(kind.into());
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.match_filter = Some(filter);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

impl From<&str> for PopulateOptions {
    fn from(path: &str) -> Self {
        PopulateOptions::new(path)
    }
}

/// Resolves references against a store using registered schemas
pub struct Populator<'a> {
    store: &'a dyn DocumentStore,
    registry: &'a SchemaRegistry,
}

impl<'a> Populator<'a> {
    pub fn new(store: &'a dyn DocumentStore, registry: &'a SchemaRegistry) -> Self {
        Self { store, registry }
    }

    /// Resolve `options.path` in every document of `documents`, in place
    #[instrument(skip(self, model, documents, options), fields(kind = model.kind(), path = %options.path, documents = documents.len()))]
    pub async fn populate(
        &self,
        model: &Model,
        documents: &mut [BsonDocument],
        options: &PopulateOptions,
    ) -> Result<()> {
        let target = self.target_model(model, options)?;
        let ids = collect_ids(documents, &options.path);
        if ids.is_empty() {
            debug!("No references to resolve");
            return Ok(());
        }

        let mut filter = Filter::is_in(ID_FIELD, ids.iter().copied());
        if let Some(extra) = &options.match_filter {
            filter = filter.and(extra.clone());
        }

        // The id is needed to map results back; drop it afterwards if not selected
        let (projection, strip_id) = match &options.select {
            Some(select) => {
                let (projection, strip_id) = fetch_projection(select);
                (Some(projection), strip_id)
            }
            None => (None, false),
        };
        let find_options = FindOptions {
            projection,
            ..FindOptions::default()
        };

        let mut fetched = self
            .store
            .find_many(target.collection(), &filter, &find_options)
            .await?;
        if let Some(sort) = &options.sort {
            sort.sort(&mut fetched);
        }

        let mut rank = HashMap::with_capacity(fetched.len());
        let mut resolved = HashMap::with_capacity(fetched.len());
        for (position, mut doc) in fetched.into_iter().enumerate() {
            let Ok(id) = doc.get_object_id(ID_FIELD) else {
                continue;
            };
            if strip_id {
                doc.remove(ID_FIELD);
            }
            rank.insert(id, position);
            resolved.insert(id, doc);
        }

        let lookup = Resolved {
            docs: &resolved,
            rank: options.sort.as_ref().map(|_| &rank),
        };
        let mut unresolved = 0;
        for doc in documents.iter_mut() {
            if let Some(value) = get_path(doc, &options.path) {
                let (replacement, missing) = lookup.replace(value);
                unresolved += missing;
                set_path(doc, &options.path, replacement);
            }
        }

        if unresolved > 0 && options.match_filter.is_none() {
            warn!(
                target_kind = target.kind(),
                unresolved, "References with no matching document"
            );
        }
        debug!(
            target_kind = target.kind(),
            requested = ids.len(),
            found = resolved.len(),
            "Populated references"
        );
        Ok(())
    }

    fn target_model(&self, model: &Model, options: &PopulateOptions) -> Result<std::sync::Arc<Model>> {
        if let Some(kind) = &options.model {
            return self.registry.get(kind);
        }
        let kind = model
            .schema()
            .field_by_path(&options.path)
            .and_then(|field| field.field_type.reference_kind())
            .ok_or_else(|| {
                DocMapError::Query(format!(
                    "Cannot populate '{}' on {}: not a reference field",
                    options.path,
                    model.kind()
                ))
            })?;
        self.registry.get(kind)
    }
}

struct Resolved<'r> {
    docs: &'r HashMap<ObjectId, BsonDocument>,
    /// Present when results follow the populate sort rather than reference order
    rank: Option<&'r HashMap<ObjectId, usize>>,
}

impl Resolved<'_> {
    /// Replacement value and the number of references left unresolved
    fn replace(&self, value: &Bson) -> (Bson, usize) {
        match value {
            Bson::ObjectId(id) => match self.docs.get(id) {
                Some(doc) => (Bson::Document(doc.clone()), 0),
                None => (Bson::Null, 1),
            },
            Bson::Array(items) => {
                let mut missing = 0;
                let mut kept: Vec<(usize, Bson)> = Vec::with_capacity(items.len());
                for (position, item) in items.iter().enumerate() {
                    match item {
                        Bson::ObjectId(id) => match self.docs.get(id) {
                            Some(doc) => {
                                let order = self
                                    .rank
                                    .and_then(|rank| rank.get(id).copied())
                                    .unwrap_or(position);
                                kept.push((order, Bson::Document(doc.clone())));
                            }
                            None => missing += 1,
                        },
                        // Already resolved or not an id
                        other => kept.push((position, other.clone())),
                    }
                }
                if self.rank.is_some() {
                    kept.sort_by_key(|(order, _)| *order);
                }
                (Bson::Array(kept.into_iter().map(|(_, v)| v).collect()), missing)
            }
            other => (other.clone(), 0),
        }
    }
}

/// Distinct referenced ids in first-seen order
fn collect_ids(documents: &[BsonDocument], path: &str) -> Vec<ObjectId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut push = |id: &ObjectId| {
        if seen.insert(*id) {
            ids.push(*id);
        }
    };
    for doc in documents {
        match get_path(doc, path) {
            Some(Bson::ObjectId(id)) => push(id),
            Some(Bson::Array(items)) => items.iter().filter_map(Bson::as_object_id).for_each(|id| push(&id)),
            _ => {}
        }
    }
    ids
}

fn fetch_projection(select: &Projection) -> (Projection, bool) {
    match select {
        Projection::Include { fields, keep_id } => (
            Projection::Include {
                fields: fields.clone(),
                keep_id: true,
            },
            !keep_id,
        ),
        Projection::Exclude(fields) => {
            let strip_id = fields.iter().any(|f| f == ID_FIELD);
            let kept = fields.iter().filter(|f| *f != ID_FIELD).cloned().collect();
            (Projection::Exclude(kept), strip_id)
        }
    }
}
