//! Chainable query builder
//!
//! Builder steps never fail. Problems with a raw filter or selection string
//! are kept and reported by the terminal call (`exec`, `exec_one`, `count`).

use crate::filter::Filter;
use crate::model::{ModelDocument, Odm};
use crate::populate::PopulateOptions;
use crate::projection::Projection;
use crate::sort::SortSpec;
use crate::store::FindOptions;
use crate::{DocMapError, Result};
use bson::Document as BsonDocument;

/// Query over one kind, executed by [`exec`](Query::exec)
pub struct Query<'a> {
    odm: &'a Odm,
    kind: String,
    filter: Filter,
    options: FindOptions,
    populate: Vec<PopulateOptions>,
    error: Option<DocMapError>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(odm: &'a Odm, kind: &str) -> Self {
        Self {
            odm,
            kind: kind.to_string(),
            filter: Filter::All,
            options: FindOptions::default(),
            populate: Vec::new(),
            error: None,
        }
    }

    /// AND a condition into the query filter
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    /// AND a MongoDB filter document into the query filter
    pub fn where_doc(self, doc: &BsonDocument) -> Self {
        match Filter::parse(doc) {
            Ok(filter) => self.filter(filter),
            Err(e) => self.fail(e),
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.options.projection = Some(projection);
        self
    }

    /// Select with a string such as `"name friends stories"`
    pub fn select_str(self, selection: &str) -> Self {
        match Projection::parse_str(selection) {
            Ok(projection) => self.select(projection),
            Err(e) => self.fail(e),
        }
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.options.sort = Some(sort);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.options.skip = n;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.options.limit = Some(n);
        self
    }

    /// Resolve a reference path after the query runs; repeatable
    pub fn populate(mut self, options: impl Into<PopulateOptions>) -> Self {
        self.populate.push(options.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    fn fail(mut self, error: DocMapError) -> Self {
        // First error wins
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    pub async fn exec(self) -> Result<Vec<ModelDocument>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.odm
            .run_query(&self.kind, &self.filter, &self.options, &self.populate)
            .await
    }

    pub async fn exec_one(self) -> Result<Option<ModelDocument>> {
        Ok(self.limit(1).exec().await?.into_iter().next())
    }

    /// Number of matching documents; paging and population are ignored
    pub async fn count(self) -> Result<u64> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.odm.count(&self.kind, &self.filter).await
    }
}
