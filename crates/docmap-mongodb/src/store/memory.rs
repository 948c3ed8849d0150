//! In-process document store
//!
//! Collections are insertion-ordered vectors behind a single lock. Filters
//! run through the same [`Filter`] engine the aggregation `$match` stage uses,
//! so query results agree with what MongoDB would return for the supported
//! operator set.

use super::{DocumentStore, FindOptions};
use crate::filter::Filter;
use crate::schema::ID_FIELD;
use crate::{DocMapError, Result};
use async_trait::async_trait;
use bson::{oid::ObjectId, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<BsonDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of collections holding at least one document
    pub fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read();
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

fn document_id(doc: &BsonDocument) -> Result<ObjectId> {
    doc.get_object_id(ID_FIELD)
        .map_err(|_| DocMapError::Store("Document has no ObjectId _id".to_string()))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_one(&self, collection: &str, doc: BsonDocument) -> Result<ObjectId> {
        let id = document_id(&doc)?;
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get_object_id(ID_FIELD).ok() == Some(id)) {
            return Err(DocMapError::Store(format!(
                "E11000 duplicate key error collection: {} _id: {}",
                collection, id
            )));
        }
        docs.push(doc);
        debug!(collection, %id, "memory insert");
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<BsonDocument>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<BsonDocument>> {
        let mut matched: Vec<BsonDocument> = {
            let collections = self.collections.read();
            collections
                .get(collection)
                .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
                .unwrap_or_default()
        };

        if let Some(sort) = &options.sort {
            sort.sort(&mut matched);
        }
        let limit = options.limit.unwrap_or(usize::MAX);
        let results: Vec<BsonDocument> = matched
            .into_iter()
            .skip(options.skip)
            .take(limit)
            .map(|doc| match &options.projection {
                Some(projection) => projection.apply(&doc),
                None => doc,
            })
            .collect();

        debug!(collection, count = results.len(), "memory find");
        Ok(results)
    }

    async fn update_by_id(&self, collection: &str, id: ObjectId, doc: BsonDocument) -> Result<bool> {
        let mut collections = self.collections.write();
        let slot = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.get_object_id(ID_FIELD).ok() == Some(id)));

        match slot {
            Some(existing) => {
                let mut replacement = doc;
                replacement.insert(ID_FIELD, id);
                *existing = replacement;
                debug!(collection, %id, "memory update");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<BsonDocument>> {
        let mut collections = self.collections.write();
        let removed = collections.get_mut(collection).and_then(|docs| {
            docs.iter()
                .position(|d| d.get_object_id(ID_FIELD).ok() == Some(id))
                .map(|pos| docs.remove(pos))
        });
        debug!(collection, %id, removed = removed.is_some(), "memory delete");
        Ok(removed)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }
}
