//! MongoDB-backed document store

use super::{id_filter, DocumentStore, FindOptions};
use crate::aggregate::Pipeline;
use crate::connection::Connection;
use crate::filter::Filter;
use crate::schema::{IndexSpec, ID_FIELD};
use crate::{DocMapError, Result};
use async_trait::async_trait;
use bson::{oid::ObjectId, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use tracing::debug;

/// Store delegating every call to a MongoDB database
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn from_connection(connection: &Connection) -> Self {
        Self::new(connection.database().clone())
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn insert_one(&self, collection: &str, doc: BsonDocument) -> Result<ObjectId> {
        let result = self.collection(collection).insert_one(doc).await?;
        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DocMapError::Store("Invalid inserted ID".to_string()))?;
        debug!(collection, %id, "mongodb insert");
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<BsonDocument>> {
        let found = self.collection(collection).find_one(filter.to_document()).await?;
        debug!(collection, found = found.is_some(), "mongodb find_one");
        Ok(found)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<BsonDocument>> {
        let mut find_options = mongodb::options::FindOptions::default();
        if let Some(projection) = &options.projection {
            find_options.projection = Some(projection.to_document());
        }
        if let Some(sort) = options.sort.as_ref().filter(|s| !s.is_empty()) {
            find_options.sort = Some(sort.to_document());
        }
        if options.skip > 0 {
            find_options.skip = Some(options.skip as u64);
        }
        if let Some(limit) = options.limit {
            find_options.limit = Some(limit as i64);
        }

        let cursor = self
            .collection(collection)
            .find(filter.to_document())
            .with_options(find_options)
            .await?;
        let docs: Vec<BsonDocument> = cursor.try_collect().await?;
        debug!(collection, count = docs.len(), "mongodb find");
        Ok(docs)
    }

    async fn update_by_id(&self, collection: &str, id: ObjectId, doc: BsonDocument) -> Result<bool> {
        let mut replacement = doc;
        replacement.remove(ID_FIELD);
        let result = self
            .collection(collection)
            .replace_one(id_filter(id).to_document(), replacement)
            .await?;
        debug!(collection, %id, matched = result.matched_count, "mongodb update");
        Ok(result.matched_count > 0)
    }

    async fn delete_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<BsonDocument>> {
        let removed = self
            .collection(collection)
            .find_one_and_delete(id_filter(id).to_document())
            .await?;
        debug!(collection, %id, removed = removed.is_some(), "mongodb delete");
        Ok(removed)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self
            .collection(collection)
            .count_documents(filter.to_document())
            .await?)
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<BsonDocument>> {
        let cursor = self
            .collection(collection)
            .aggregate(pipeline.to_documents())
            .await?;
        let docs: Vec<BsonDocument> = cursor.try_collect().await?;
        debug!(collection, stages = pipeline.stages().len(), count = docs.len(), "mongodb aggregate");
        Ok(docs)
    }

    async fn ensure_indexes(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()> {
        if indexes.is_empty() {
            return Ok(());
        }

        let models: Vec<IndexModel> = indexes
            .iter()
            .map(|spec| {
                let mut options = IndexOptions::default();
                if spec.unique {
                    options.unique = Some(true);
                }
                IndexModel::builder()
                    .keys(spec.key_document())
                    .options(options)
                    .build()
            })
            .collect();

        let result = self.collection(collection).create_indexes(models).await?;
        debug!(collection, indexes = ?result.index_names, "mongodb indexes ensured");
        Ok(())
    }
}
