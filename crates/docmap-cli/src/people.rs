//! Person and Story kinds used by the walkthrough

use docmap_mongodb::{
    FieldDefinition, Filter, IndexSpec, ModelDocument, Odm, RegexValidator, Result, Schema,
    SortDirection, TimestampOptions,
};
use docmap_mongodb::value::as_f64;
use bson::Bson;

pub const PERSON: &str = "Person";
pub const STORY: &str = "Story";

/// Age above which a person counts as old
pub const OLD_AGE: i32 = 18;

pub fn person_schema() -> Result<Schema> {
    let tel = FieldDefinition::string("tel")
        .required_with("A phone number is required")
        .validate(RegexValidator::new(
            r"\d{3}-\d{3}-\d{4}",
            "{VALUE} is not a valid phone number!",
        )?);

    Schema::builder()
        .field(FieldDefinition::string("name"))
        .field(FieldDefinition::number("age").index())
        .field(FieldDefinition::enumeration("gender", ["male", "female", "middle"]))
        .field(FieldDefinition::references("friends", PERSON))
        .field(FieldDefinition::references("stories", STORY))
        .field(FieldDefinition::nested(
            "contacts",
            vec![FieldDefinition::string("wx"), tel],
        ))
        .virtual_field("is_old", |doc| {
            let age = doc.get("age").and_then(as_f64);
            Bson::Boolean(age.map(|a| a > f64::from(OLD_AGE)).unwrap_or(false))
        })
        .collection("customedShare")
        .index(
            IndexSpec::new()
                .key("name", SortDirection::Ascending)
                .key("age", SortDirection::Descending),
        )
        .strict(true)
        .minimize(true)
        .validate_before_save(true)
        .version_key(Some("_somethingElse"))
        .timestamps(TimestampOptions {
            created_at: "created_at".to_string(),
            ..TimestampOptions::default()
        })
        .build()
}

pub fn story_schema() -> Result<Schema> {
    Schema::builder()
        .field(FieldDefinition::reference("author", PERSON))
        .field(FieldDefinition::string("t").alias("title"))
        .field(FieldDefinition::references("fans", PERSON))
        .build()
}

pub fn register(odm: &Odm) -> Result<()> {
    odm.register(PERSON, person_schema()?)?;
    odm.register(STORY, story_schema()?)?;
    Ok(())
}

/// Everyone older than `threshold`
pub async fn find_old_people(odm: &Odm, threshold: i32) -> Result<Vec<ModelDocument>> {
    odm.find(PERSON, Filter::gt("age", threshold), None).await
}
