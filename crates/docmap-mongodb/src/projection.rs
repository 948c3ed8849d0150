//! Field projections
//!
//! A projection either keeps only the named fields or drops them. Inclusion
//! projections keep `_id` unless it is excluded explicitly.

use crate::schema::ID_FIELD;
use crate::value::{get_path, remove_path, set_path};
use crate::{DocMapError, Result};
use bson::{Bson, Document as BsonDocument};

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Keep only these paths
    Include { fields: Vec<String>, keep_id: bool },
    /// Drop these paths
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include {
            fields: fields.into_iter().map(Into::into).collect(),
            keep_id: true,
        }
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Drop `_id` from an inclusion projection
    pub fn without_id(self) -> Self {
        match self {
            Projection::Include { fields, .. } => Projection::Include {
                fields,
                keep_id: false,
            },
            Projection::Exclude(mut fields) => {
                if !fields.iter().any(|f| f == ID_FIELD) {
                    fields.push(ID_FIELD.to_string());
                }
                Projection::Exclude(fields)
            }
        }
    }

    /// Parse a selection string: `"name friends stories"` or `"-contacts -__v"`
    pub fn parse_str(selection: &str) -> Result<Self> {
        let mut doc = BsonDocument::new();
        for token in selection.split_whitespace() {
            match token.strip_prefix('-') {
                Some(field) if !field.is_empty() => doc.insert(field, 0),
                Some(_) => return Err(DocMapError::Query("Empty field in selection".to_string())),
                None => doc.insert(token.trim_start_matches('+'), 1),
            };
        }
        Self::from_document(&doc)
    }

    /// Parse `{ name: 1, age: 1, _id: 0 }` or `{ contacts: 0 }`
    pub fn from_document(doc: &BsonDocument) -> Result<Self> {
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut keep_id = true;

        for (field, flag) in doc {
            let on = match flag {
                Bson::Boolean(b) => *b,
                other => match crate::value::as_f64(other) {
                    Some(n) => n != 0.0,
                    None => {
                        return Err(DocMapError::Query(format!(
                            "Projection value for '{}' must be 0/1 or a boolean, got {}",
                            field, other
                        )))
                    }
                },
            };
            if field == ID_FIELD {
                keep_id = on;
                if !on {
                    excluded.push(field.clone());
                }
                continue;
            }
            if on {
                included.push(field.clone());
            } else {
                excluded.push(field.clone());
            }
        }

        let excludes_only_id = excluded.len() == 1 && !keep_id;
        match (included.is_empty(), excluded.is_empty()) {
            (false, true) => Ok(Projection::Include { fields: included, keep_id }),
            (false, false) if excludes_only_id => Ok(Projection::Include { fields: included, keep_id }),
            (true, _) if !excluded.is_empty() => Ok(Projection::Exclude(excluded)),
            (true, _) => Err(DocMapError::Query("Projection is empty".to_string())),
            _ => Err(DocMapError::Query(
                "Projection cannot mix inclusion and exclusion".to_string(),
            )),
        }
    }

    pub fn to_document(&self) -> BsonDocument {
        let mut doc = BsonDocument::new();
        match self {
            Projection::Include { fields, keep_id } => {
                for field in fields {
                    doc.insert(field.clone(), 1);
                }
                if !keep_id {
                    doc.insert(ID_FIELD, 0);
                }
            }
            Projection::Exclude(fields) => {
                for field in fields {
                    doc.insert(field.clone(), 0);
                }
            }
        }
        doc
    }

    pub fn apply(&self, doc: &BsonDocument) -> BsonDocument {
        match self {
            Projection::Include { fields, keep_id } => {
                let mut out = BsonDocument::new();
                if *keep_id {
                    if let Some(id) = doc.get(ID_FIELD) {
                        out.insert(ID_FIELD, id.clone());
                    }
                }
                for field in fields {
                    if let Some(value) = get_path(doc, field) {
                        set_path(&mut out, field, value.clone());
                    }
                }
                out
            }
            Projection::Exclude(fields) => {
                let mut out = doc.clone();
                for field in fields {
                    remove_path(&mut out, field);
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn test_include_keeps_id_by_default() {
        let id = ObjectId::new();
        let d = doc! { "_id": id, "name": "Amy", "age": 17 };
        let projection = Projection::parse_str("name").unwrap();
        assert_eq!(projection.apply(&d), doc! { "_id": id, "name": "Amy" });
    }

    #[test]
    fn test_include_without_id() {
        let d = doc! { "_id": ObjectId::new(), "name": "Amy", "age": 17, "gender": "female" };
        let projection =
            Projection::from_document(&doc! { "name": 1, "age": 1, "gender": 1, "_id": 0 }).unwrap();
        assert_eq!(projection.apply(&d), doc! { "name": "Amy", "age": 17, "gender": "female" });
    }

    #[test]
    fn test_exclude() {
        let d = doc! { "name": "Amy", "contacts": { "tel": "1", "wx": "2" } };
        let projection = Projection::parse_str("-contacts.wx").unwrap();
        assert_eq!(projection.apply(&d), doc! { "name": "Amy", "contacts": { "tel": "1" } });
    }

    #[test]
    fn test_nested_include() {
        let d = doc! { "name": "Amy", "contacts": { "tel": "1", "wx": "2" } };
        let projection = Projection::include(["contacts.tel"]).without_id();
        assert_eq!(projection.apply(&d), doc! { "contacts": { "tel": "1" } });
    }

    #[test]
    fn test_mixed_projection_rejected() {
        let result = Projection::from_document(&doc! { "name": 1, "age": 0 });
        assert!(result.unwrap_err().to_string().contains("mix"));
    }

    #[test]
    fn test_exclude_only_id() {
        let projection = Projection::from_document(&doc! { "_id": 0 }).unwrap();
        assert_eq!(projection, Projection::Exclude(vec!["_id".to_string()]));
    }

    #[test]
    fn test_missing_fields_are_skipped() {
        let projection = Projection::parse_str("name title").unwrap();
        assert_eq!(projection.apply(&doc! { "name": "Amy" }), doc! { "name": "Amy" });
    }

    #[test]
    fn test_to_document() {
        let projection = Projection::include(["name"]).without_id();
        assert_eq!(projection.to_document(), doc! { "name": 1, "_id": 0 });
    }
}
