//! Compiled query filters
//!
//! Filters are written in MongoDB document syntax and compiled once into a
//! [`Filter`] tree, so evaluation never fails. Supported:
//!
//! - implicit equality: `{ name: "Amy" }` (array fields match by containment)
//! - comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - membership: `$in`, `$nin`
//! - `$exists`
//! - logical: `$and`, `$or`, `$nor`
//!
//! Dotted paths (`contacts.tel`) address nested fields.

use crate::value::{as_f64, bson_eq, compare_bson, get_path};
use crate::{DocMapError, Result};
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

/// Comparison applied to one field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
}

/// Predicate over documents
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every document
    #[default]
    All,
    Field { path: String, condition: Condition },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
}

impl Filter {
    /// Compile a MongoDB-style filter document
    pub fn parse(doc: &BsonDocument) -> Result<Self> {
        let mut clauses = Vec::new();
        for (key, value) in doc {
            match key.as_str() {
                "$and" => clauses.push(Filter::And(parse_list(key, value)?)),
                "$or" => clauses.push(Filter::Or(parse_list(key, value)?)),
                "$nor" => clauses.push(Filter::Nor(parse_list(key, value)?)),
                op if op.starts_with('$') => {
                    return Err(DocMapError::Query(format!(
                        "Unsupported top-level operator: {}",
                        op
                    )))
                }
                path => clauses.extend(parse_field(path, value)?),
            }
        }

        Ok(match clauses.len() {
            0 => Filter::All,
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        })
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::Field {
            path: path.into(),
            condition: Condition::Eq(value.into()),
        }
    }

    pub fn is_in<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Filter::Field {
            path: path.into(),
            condition: Condition::In(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::Field {
            path: path.into(),
            condition: Condition::Gt(value.into()),
        }
    }

    /// Combine with another filter, flattening nested conjunctions
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, other) => Filter::And(vec![f, other]),
        }
    }

    pub fn matches(&self, doc: &BsonDocument) -> bool {
        match self {
            Filter::All => true,
            Filter::Field { path, condition } => condition.matches(get_path(doc, path)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
        }
    }

    /// Render back to MongoDB document syntax (for pushing down to a server)
    pub fn to_document(&self) -> BsonDocument {
        match self {
            Filter::All => BsonDocument::new(),
            Filter::Field { path, condition } => {
                let mut doc = BsonDocument::new();
                doc.insert(path.clone(), condition.to_bson());
                doc
            }
            Filter::And(filters) => logical_document("$and", filters),
            Filter::Or(filters) => logical_document("$or", filters),
            Filter::Nor(filters) => logical_document("$nor", filters),
        }
    }
}

fn logical_document(op: &str, filters: &[Filter]) -> BsonDocument {
    let items: Vec<Bson> = filters.iter().map(|f| Bson::Document(f.to_document())).collect();
    let mut doc = BsonDocument::new();
    doc.insert(op, items);
    doc
}

fn parse_list(op: &str, value: &Bson) -> Result<Vec<Filter>> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(DocMapError::Query(format!(
                "{} expects a non-empty array of filter documents",
                op
            )))
        }
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Filter::parse(doc),
            other => Err(DocMapError::Query(format!(
                "{} entries must be documents, got {}",
                op, other
            ))),
        })
        .collect()
}

fn parse_field(path: &str, value: &Bson) -> Result<Vec<Filter>> {
    let operators = match value {
        Bson::Document(doc) if doc.keys().next().map(|k| k.starts_with('$')).unwrap_or(false) => doc,
        other => {
            return Ok(vec![Filter::Field {
                path: path.to_string(),
                condition: Condition::Eq(other.clone()),
            }])
        }
    };

    operators
        .iter()
        .map(|(op, arg)| {
            let condition = match op.as_str() {
                "$eq" => Condition::Eq(arg.clone()),
                "$ne" => Condition::Ne(arg.clone()),
                "$gt" => Condition::Gt(arg.clone()),
                "$gte" => Condition::Gte(arg.clone()),
                "$lt" => Condition::Lt(arg.clone()),
                "$lte" => Condition::Lte(arg.clone()),
                "$in" => Condition::In(expect_array(op, arg)?),
                "$nin" => Condition::Nin(expect_array(op, arg)?),
                "$exists" => Condition::Exists(match arg {
                    Bson::Boolean(b) => *b,
                    other => as_f64(other).map(|n| n != 0.0).unwrap_or(true),
                }),
                unknown => {
                    return Err(DocMapError::Query(format!(
                        "Unsupported operator {} on field '{}'",
                        unknown, path
                    )))
                }
            };
            Ok(Filter::Field {
                path: path.to_string(),
                condition,
            })
        })
        .collect()
}

fn expect_array(op: &str, arg: &Bson) -> Result<Vec<Bson>> {
    match arg {
        Bson::Array(items) => Ok(items.clone()),
        other => Err(DocMapError::Query(format!(
            "{} expects an array, got {}",
            op, other
        ))),
    }
}

impl Condition {
    fn matches(&self, value: Option<&Bson>) -> bool {
        match self {
            Condition::Exists(expected) => value.is_some() == *expected,
            Condition::Eq(target) => equals(value, target),
            Condition::Ne(target) => !equals(value, target),
            Condition::In(targets) => targets.iter().any(|t| equals(value, t)),
            Condition::Nin(targets) => !targets.iter().any(|t| equals(value, t)),
            Condition::Gt(target) => compares(value, target, |o| o == Ordering::Greater),
            Condition::Gte(target) => compares(value, target, |o| o != Ordering::Less),
            Condition::Lt(target) => compares(value, target, |o| o == Ordering::Less),
            Condition::Lte(target) => compares(value, target, |o| o != Ordering::Greater),
        }
    }

    fn to_bson(&self) -> Bson {
        let (op, arg) = match self {
            Condition::Eq(v) => ("$eq", v.clone()),
            Condition::Ne(v) => ("$ne", v.clone()),
            Condition::Gt(v) => ("$gt", v.clone()),
            Condition::Gte(v) => ("$gte", v.clone()),
            Condition::Lt(v) => ("$lt", v.clone()),
            Condition::Lte(v) => ("$lte", v.clone()),
            Condition::In(vs) => ("$in", Bson::Array(vs.clone())),
            Condition::Nin(vs) => ("$nin", Bson::Array(vs.clone())),
            Condition::Exists(b) => ("$exists", Bson::Boolean(*b)),
        };
        let mut doc = BsonDocument::new();
        doc.insert(op, arg);
        Bson::Document(doc)
    }
}

// Missing fields equal null; array fields match when any element matches.
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| bson_eq(item, target))
        }
        Some(v) => bson_eq(v, target),
    }
}

// Range operators only compare values of the same type class. NaN is
// only comparable with NaN.
fn compares(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let same_class = |v: &Bson| match (as_f64(v), as_f64(target)) {
        (Some(x), Some(y)) => x.is_nan() == y.is_nan(),
        (None, None) => std::mem::discriminant(v) == std::mem::discriminant(target),
        _ => false,
    };
    match value {
        None => false,
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| same_class(item) && accept(compare_bson(item, target))),
        Some(v) => same_class(v) && accept(compare_bson(v, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn people() -> Vec<BsonDocument> {
        vec![
            doc! { "name": "Amy", "age": 17, "gender": "female", "tags": ["a", "b"] },
            doc! { "name": "Bob", "age": 70, "gender": "male", "contacts": { "tel": "555" } },
            doc! { "name": "Cat", "age": 45.5, "gender": "middle" },
        ]
    }

    fn names(filter: &Filter) -> Vec<String> {
        people()
            .iter()
            .filter(|d| filter.matches(d))
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let filter = Filter::parse(&doc! {}).unwrap();
        assert_eq!(filter, Filter::All);
        assert_eq!(names(&filter).len(), 3);
    }

    #[test]
    fn test_implicit_equality() {
        let filter = Filter::parse(&doc! { "name": "Amy" }).unwrap();
        assert_eq!(names(&filter), vec!["Amy"]);
    }

    #[test]
    fn test_greater_than() {
        let filter = Filter::parse(&doc! { "age": { "$gt": 18 } }).unwrap();
        assert_eq!(names(&filter), vec!["Bob", "Cat"]);
    }

    #[test]
    fn test_range_combination() {
        let filter = Filter::parse(&doc! { "age": { "$gte": 17, "$lt": 50 } }).unwrap();
        assert_eq!(names(&filter), vec!["Amy", "Cat"]);
    }

    #[test]
    fn test_set_membership() {
        let filter = Filter::parse(&doc! { "gender": { "$in": ["male", "female"] } }).unwrap();
        assert_eq!(names(&filter), vec!["Amy", "Bob"]);

        let filter = Filter::parse(&doc! { "gender": { "$nin": ["male", "female"] } }).unwrap();
        assert_eq!(names(&filter), vec!["Cat"]);
    }

    #[test]
    fn test_array_containment() {
        let filter = Filter::parse(&doc! { "tags": "b" }).unwrap();
        assert_eq!(names(&filter), vec!["Amy"]);
    }

    #[test]
    fn test_nested_path_and_exists() {
        let filter = Filter::parse(&doc! { "contacts.tel": "555" }).unwrap();
        assert_eq!(names(&filter), vec!["Bob"]);

        let filter = Filter::parse(&doc! { "contacts": { "$exists": false } }).unwrap();
        assert_eq!(names(&filter), vec!["Amy", "Cat"]);
    }

    #[test]
    fn test_logical_operators() {
        let filter = Filter::parse(&doc! {
            "$or": [ { "name": "Amy" }, { "age": { "$gt": 60 } } ]
        })
        .unwrap();
        assert_eq!(names(&filter), vec!["Amy", "Bob"]);

        let filter = Filter::parse(&doc! { "$nor": [ { "name": "Amy" } ] }).unwrap();
        assert_eq!(names(&filter), vec!["Bob", "Cat"]);
    }

    fn readings() -> Vec<BsonDocument> {
        vec![
            doc! { "name": "low", "level": 3 },
            doc! { "name": "nan", "level": f64::NAN },
            doc! { "name": "high", "level": 90.5 },
            doc! { "name": "dec", "level": Bson::Decimal128("10".parse().unwrap()) },
        ]
    }

    fn reading_names(filter: &Filter) -> Vec<String> {
        readings()
            .iter()
            .filter(|d| filter.matches(d))
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_nan_equality() {
        let filter = Filter::parse(&doc! { "level": f64::NAN }).unwrap();
        assert_eq!(reading_names(&filter), vec!["nan"]);

        let filter = Filter::parse(&doc! { "level": { "$ne": f64::NAN } }).unwrap();
        assert_eq!(reading_names(&filter), vec!["low", "high", "dec"]);

        let filter = Filter::parse(&doc! { "level": { "$in": [f64::NAN] } }).unwrap();
        assert_eq!(reading_names(&filter), vec!["nan"]);

        let filter = Filter::parse(&doc! { "age": f64::NAN }).unwrap();
        assert!(names(&filter).is_empty());
    }

    #[test]
    fn test_nan_in_ranges() {
        let filter = Filter::parse(&doc! { "level": { "$gt": f64::NAN } }).unwrap();
        assert!(reading_names(&filter).is_empty());

        let filter = Filter::parse(&doc! { "level": { "$lt": 50 } }).unwrap();
        assert_eq!(reading_names(&filter), vec!["low", "dec"]);

        let filter = Filter::parse(&doc! { "level": { "$gte": f64::NAN } }).unwrap();
        assert_eq!(reading_names(&filter), vec!["nan"]);
    }

    #[test]
    fn test_decimal_ranges() {
        let filter = Filter::parse(&doc! { "level": { "$gt": 5 } }).unwrap();
        assert_eq!(reading_names(&filter), vec!["high", "dec"]);

        let filter = Filter::parse(&doc! { "level": 10 }).unwrap();
        assert_eq!(reading_names(&filter), vec!["dec"]);
    }

    #[test]
    fn test_range_ignores_other_types() {
        let filter = Filter::parse(&doc! { "name": { "$gt": 10 } }).unwrap();
        assert!(names(&filter).is_empty());
    }

    #[test]
    fn test_missing_equals_null() {
        let filter = Filter::parse(&doc! { "tags": Bson::Null }).unwrap();
        assert_eq!(names(&filter), vec!["Bob", "Cat"]);
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let result = Filter::parse(&doc! { "age": { "$where": "1" } });
        assert!(result.unwrap_err().to_string().contains("$where"));

        let result = Filter::parse(&doc! { "$text": { "$search": "x" } });
        assert!(result.is_err());
    }

    #[test]
    fn test_in_requires_array() {
        assert!(Filter::parse(&doc! { "gender": { "$in": "male" } }).is_err());
    }

    #[test]
    fn test_round_trip_to_document() {
        let filter = Filter::gt("age", 18).and(Filter::is_in("gender", ["male"]));
        let reparsed = Filter::parse(&filter.to_document()).unwrap();
        assert_eq!(names(&reparsed), names(&filter));
        assert_eq!(names(&filter), vec!["Bob"]);
    }
}
