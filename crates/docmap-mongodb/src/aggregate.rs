//! Aggregation pipeline executor
//!
//! Stages run strictly in declared order; nothing is reordered or merged.
//! Every stage accepts an empty input and then produces an empty output
//! (`count` on an empty input produces no document, as MongoDB does).

use crate::filter::Filter;
use crate::projection::Projection;
use crate::sort::SortSpec;
use crate::{DocMapError, Result};
use bson::{Bson, Document as BsonDocument};

/// One pipeline transform
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Project(Projection),
    Match(Filter),
    Skip(usize),
    Limit(usize),
    Sort(SortSpec),
    /// Replace the sequence with a single `{ <field>: n }` document
    Count(String),
}

impl Stage {
    /// Parse one MongoDB stage document (`{ $skip: 5 }`)
    pub fn from_document(doc: &BsonDocument) -> Result<Self> {
        if doc.len() != 1 {
            return Err(DocMapError::Query(format!(
                "A pipeline stage must have exactly one operator, got {}",
                doc.len()
            )));
        }
        let (op, arg) = doc
            .iter()
            .next()
            .ok_or_else(|| DocMapError::Query("Empty pipeline stage".to_string()))?;

        match op.as_str() {
            "$project" => Ok(Stage::Project(Projection::from_document(expect_document(op, arg)?)?)),
            "$match" => Ok(Stage::Match(Filter::parse(expect_document(op, arg)?)?)),
            "$sort" => Ok(Stage::Sort(SortSpec::from_document(expect_document(op, arg)?)?)),
            "$skip" => Ok(Stage::Skip(expect_count(op, arg)?)),
            "$limit" => {
                let n = expect_count(op, arg)?;
                if n == 0 {
                    return Err(DocMapError::Query("$limit must be positive".to_string()));
                }
                Ok(Stage::Limit(n))
            }
            "$count" => match arg {
                Bson::String(field) if !field.is_empty() && !field.starts_with('$') => {
                    Ok(Stage::Count(field.clone()))
                }
                other => Err(DocMapError::Query(format!(
                    "$count expects a non-empty field name, got {}",
                    other
                ))),
            },
            unknown => Err(DocMapError::Query(format!(
                "Unsupported pipeline stage: {}",
                unknown
            ))),
        }
    }

    pub fn to_document(&self) -> BsonDocument {
        let mut doc = BsonDocument::new();
        match self {
            Stage::Project(p) => doc.insert("$project", p.to_document()),
            Stage::Match(f) => doc.insert("$match", f.to_document()),
            Stage::Skip(n) => doc.insert("$skip", *n as i64),
            Stage::Limit(n) => doc.insert("$limit", *n as i64),
            Stage::Sort(s) => doc.insert("$sort", s.to_document()),
            Stage::Count(field) => doc.insert("$count", field.clone()),
        };
        doc
    }

    fn apply(&self, documents: Vec<BsonDocument>) -> Vec<BsonDocument> {
        match self {
            Stage::Project(projection) => documents.iter().map(|d| projection.apply(d)).collect(),
            Stage::Match(filter) => documents.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Skip(n) => documents.into_iter().skip(*n).collect(),
            Stage::Limit(n) => documents.into_iter().take(*n).collect(),
            Stage::Sort(spec) => {
                let mut documents = documents;
                spec.sort(&mut documents);
                documents
            }
            Stage::Count(field) => {
                if documents.is_empty() {
                    return documents;
                }
                let mut doc = BsonDocument::new();
                doc.insert(field.clone(), documents.len() as i64);
                vec![doc]
            }
        }
    }
}

fn expect_document<'a>(op: &str, arg: &'a Bson) -> Result<&'a BsonDocument> {
    match arg {
        Bson::Document(doc) => Ok(doc),
        other => Err(DocMapError::Query(format!(
            "{} expects a document, got {}",
            op, other
        ))),
    }
}

fn expect_count(op: &str, arg: &Bson) -> Result<usize> {
    match crate::value::as_f64(arg) {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(DocMapError::Query(format!(
            "{} expects a non-negative integer, got {}",
            op, arg
        ))),
    }
}

/// Apply every stage in order
pub fn run(documents: Vec<BsonDocument>, stages: &[Stage]) -> Vec<BsonDocument> {
    stages
        .iter()
        .fold(documents, |docs, stage| stage.apply(docs))
}

/// Ordered stage list with a builder API
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `[{ $project: .. }, { $match: .. }, ...]`
    pub fn from_documents(stages: &[BsonDocument]) -> Result<Self> {
        let stages = stages
            .iter()
            .map(Stage::from_document)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn project(self, projection: Projection) -> Self {
        self.stage(Stage::Project(projection))
    }

    pub fn filter(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    pub fn skip(self, n: usize) -> Self {
        self.stage(Stage::Skip(n))
    }

    pub fn limit(self, n: usize) -> Self {
        self.stage(Stage::Limit(n))
    }

    pub fn sort(self, spec: SortSpec) -> Self {
        self.stage(Stage::Sort(spec))
    }

    pub fn count(self, field: impl Into<String>) -> Self {
        self.stage(Stage::Count(field.into()))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn to_documents(&self) -> Vec<BsonDocument> {
        self.stages.iter().map(Stage::to_document).collect()
    }

    pub fn run(&self, documents: Vec<BsonDocument>) -> Vec<BsonDocument> {
        run(documents, &self.stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn numbered(n: i32) -> Vec<BsonDocument> {
        (1..=n).map(|i| doc! { "n": i, "gender": if i % 2 == 0 { "male" } else { "middle" } }).collect()
    }

    #[test]
    fn test_skip_then_limit_returns_third_element() {
        let pipeline = Pipeline::new().skip(2).limit(1);
        assert_eq!(pipeline.run(numbered(5)), vec![numbered(5)[2].clone()]);
    }

    #[test]
    fn test_skip_past_end_is_empty_and_idempotent() {
        let pipeline = Pipeline::new().skip(2).limit(1);
        let first = pipeline.run(numbered(1));
        assert!(first.is_empty());
        assert_eq!(pipeline.run(first.clone()), first);
    }

    #[test]
    fn test_order_matters() {
        let limit_then_skip = Pipeline::new().limit(1).skip(2);
        assert!(limit_then_skip.run(numbered(5)).is_empty());
    }

    #[test]
    fn test_empty_input_every_stage() {
        let pipeline = Pipeline::new()
            .project(Projection::include(["n"]))
            .filter(Filter::eq("n", 1))
            .sort(SortSpec::desc("n"))
            .skip(1)
            .limit(3)
            .count("total");
        assert!(pipeline.run(Vec::new()).is_empty());
    }

    #[test]
    fn test_parse_tutorial_pipeline() {
        let pipeline = Pipeline::from_documents(&[
            doc! { "$project": { "n": 1, "gender": 1, "_id": 0 } },
            doc! { "$match": { "gender": { "$in": ["male", "female"] } } },
            doc! { "$skip": 1 },
            doc! { "$limit": 10 },
        ])
        .unwrap();

        let result = pipeline.run(numbered(6));
        let ns: Vec<i32> = result.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(ns, vec![4, 6]);
    }

    #[test]
    fn test_sort_and_count() {
        let sorted = Pipeline::new().sort(SortSpec::desc("n")).limit(2).run(numbered(4));
        assert_eq!(sorted[0].get_i32("n").unwrap(), 4);
        assert_eq!(sorted[1].get_i32("n").unwrap(), 3);

        let counted = Pipeline::new().filter(Filter::eq("gender", "male")).count("males").run(numbered(5));
        assert_eq!(counted, vec![doc! { "males": 2_i64 }]);
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let result = Pipeline::from_documents(&[doc! { "$group": { "_id": "$gender" } }]);
        assert!(result.unwrap_err().to_string().contains("$group"));
    }

    #[test]
    fn test_invalid_stage_arguments() {
        assert!(Stage::from_document(&doc! { "$skip": -1 }).is_err());
        assert!(Stage::from_document(&doc! { "$limit": 0 }).is_err());
        assert!(Stage::from_document(&doc! { "$match": 3 }).is_err());
        assert!(Stage::from_document(&doc! { "$skip": 1, "$limit": 2 }).is_err());
    }

    #[test]
    fn test_to_documents_round_trip() {
        let pipeline = Pipeline::new().skip(5).limit(10).count("n");
        let reparsed = Pipeline::from_documents(&pipeline.to_documents()).unwrap();
        assert_eq!(reparsed, pipeline);
    }
}
