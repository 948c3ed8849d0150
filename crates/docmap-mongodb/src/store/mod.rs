//! Storage collaborators
//!
//! The facade never talks to a database directly. It goes through the
//! [`DocumentStore`] trait, which has an in-process implementation for tests
//! and offline runs and a MongoDB implementation backed by the driver.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::aggregate::Pipeline;
use crate::filter::Filter;
use crate::projection::Projection;
use crate::schema::IndexSpec;
use crate::sort::SortSpec;
use crate::{DocMapError, Result};
use async_trait::async_trait;
use bson::{oid::ObjectId, Document as BsonDocument};
use futures::future::join_all;

/// Read options for [`DocumentStore::find_many`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<SortSpec>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Narrow interface to durable document storage
///
/// Every document handed to a store already carries its `_id`.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    async fn insert_one(&self, collection: &str, doc: BsonDocument) -> Result<ObjectId>;

    /// Insert every document with independent concurrent writes
    ///
    /// All writes are awaited before returning. Any failure is reported as
    /// [`DocMapError::BatchWrite`] naming the failed positions; documents that
    /// were written successfully stay written.
    async fn insert_many(&self, collection: &str, docs: Vec<BsonDocument>) -> Result<Vec<ObjectId>> {
        let outcomes = join_all(docs.into_iter().map(|doc| self.insert_one(collection, doc))).await;

        let mut ids = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        let mut messages = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(id) => ids.push(id),
                Err(e) => {
                    failed.push(index);
                    messages.push(format!("[{}] {}", index, e));
                }
            }
        }

        if failed.is_empty() {
            Ok(ids)
        } else {
            Err(DocMapError::BatchWrite {
                failed,
                message: messages.join("; "),
            })
        }
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<BsonDocument>>;

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<BsonDocument>>;

    /// Replace the stored document with this `_id`; false if none matched
    async fn update_by_id(&self, collection: &str, id: ObjectId, doc: BsonDocument) -> Result<bool>;

    /// Remove and return the stored document with this `_id`
    async fn delete_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<BsonDocument>>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Run an aggregation pipeline over a whole collection
    ///
    /// The default loads the collection and evaluates the stages in process.
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<BsonDocument>> {
        let docs = self
            .find_many(collection, &Filter::All, &FindOptions::default())
            .await?;
        Ok(pipeline.run(docs))
    }

    /// Create indexes; stores without index support accept and ignore them
    async fn ensure_indexes(&self, _collection: &str, _indexes: &[IndexSpec]) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn id_filter(id: ObjectId) -> Filter {
    Filter::eq(crate::schema::ID_FIELD, id)
}
