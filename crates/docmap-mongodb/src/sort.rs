//! Sort specifications

use crate::value::{compare_bson, get_path};
use crate::{DocMapError, Result};
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

/// Direction of a sort key or index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Parse the MongoDB numeric form (1 / -1)
    pub fn from_bson(value: &Bson) -> Result<Self> {
        match crate::value::as_f64(value) {
            Some(v) if v == 1.0 => Ok(SortDirection::Ascending),
            Some(v) if v == -1.0 => Ok(SortDirection::Descending),
            _ => Err(DocMapError::Query(format!(
                "Sort direction must be 1 or -1, got {}",
                value
            ))),
        }
    }

    /// MongoDB numeric form of this direction
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }

    fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Ordered list of sort keys
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortSpec {
    keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single ascending key
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new().then(field, SortDirection::Ascending)
    }

    /// Single descending key
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new().then(field, SortDirection::Descending)
    }

    /// Append a tie-breaking key
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    /// Parse `{ name: -1, age: 1 }`
    pub fn from_document(doc: &BsonDocument) -> Result<Self> {
        let mut spec = Self::new();
        for (field, value) in doc {
            spec.keys.push((field.clone(), SortDirection::from_bson(value)?));
        }
        Ok(spec)
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Convert back to the MongoDB document form
    pub fn to_document(&self) -> BsonDocument {
        let mut doc = BsonDocument::new();
        for (field, direction) in &self.keys {
            doc.insert(field.clone(), direction.as_i32());
        }
        doc
    }

    /// Compare two documents by every key in order; missing fields sort as null
    pub fn compare(&self, a: &BsonDocument, b: &BsonDocument) -> Ordering {
        for (field, direction) in &self.keys {
            let left = get_path(a, field).unwrap_or(&Bson::Null);
            let right = get_path(b, field).unwrap_or(&Bson::Null);
            let ord = direction.apply(compare_bson(left, right));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort
    pub fn sort(&self, docs: &mut [BsonDocument]) {
        if self.keys.is_empty() {
            return;
        }
        docs.sort_by(|a, b| self.compare(a, b));
    }
}
