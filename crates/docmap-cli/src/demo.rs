//! Tutorial walkthrough: seed, save, update, populate, query, delete, aggregate

use crate::people::{self, OLD_AGE, PERSON, STORY};
use crate::seed::Seeder;
use anyhow::{Context, Result};
use bson::{doc, oid::ObjectId, Bson};
use docmap_mongodb::{
    Filter, ModelDocument, Odm, Pipeline, PopulateOptions, Projection, SortSpec,
};
use serde_json::Value;

/// Sizes of the mock batches
#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    pub persons: usize,
    pub stories: usize,
    pub seed: Option<u64>,
}

/// What the walkthrough produced, for callers that want more than the printout
#[derive(Debug, Default)]
pub struct DemoReport {
    pub persons_inserted: usize,
    pub stories_inserted: usize,
    pub friends_resolved: usize,
    pub stories_resolved: usize,
    pub old_people: usize,
    pub deleted: Option<ObjectId>,
    pub aggregated: usize,
}

fn print_step(step: u8, title: &str, value: &Value) {
    let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    println!("({}) {}\n{}\n", step, title, body);
}

fn json_list(docs: &[ModelDocument]) -> Value {
    Value::Array(docs.iter().map(ModelDocument::to_json).collect())
}

fn array_len(doc: &ModelDocument, path: &str) -> usize {
    doc.get(path).and_then(Bson::as_array).map_or(0, Vec::len)
}

pub async fn run(odm: &Odm, options: DemoOptions) -> Result<DemoReport> {
    people::register(odm).context("Failed to register schemas")?;
    odm.ensure_indexes(PERSON).await.context("Failed to create indexes")?;

    let mut seeder = Seeder::new(options.seed);
    let persons = seeder.persons(options.persons);
    let stories = seeder.stories(options.stories);
    let mut report = DemoReport::default();

    // 1. Two batch inserts running side by side
    let (inserted_persons, inserted_stories) = tokio::try_join!(
        odm.insert_many(PERSON, persons.clone()),
        odm.insert_many(STORY, stories),
    )
    .context("Batch insert failed")?;
    report.persons_inserted = inserted_persons.len();
    report.stories_inserted = inserted_stories.len();
    print_step(
        1,
        "insert_many persons and stories",
        &Value::Array(vec![json_list(&inserted_persons), json_list(&inserted_stories)]),
    );

    // 2. A single document from the first mock person
    let first = persons
        .first()
        .cloned()
        .context("At least one mock person is required")?;
    let mut single = odm.insert(PERSON, first).await.context("Insert failed")?;
    print_step(2, "insert a single person", &single.to_json());

    // 3. Mutate in place and save
    let story_ids: Vec<ObjectId> = inserted_stories.iter().filter_map(ModelDocument::id).collect();
    let friend_ids: Vec<ObjectId> = inserted_persons.iter().filter_map(ModelDocument::id).collect();
    single.set("stories", story_ids);
    single.set("friends", friend_ids);
    odm.save(&mut single).await.context("Save failed")?;
    print_step(3, "person after linking friends and stories", &single.to_json());

    // 4. Query with chained population
    let id = single.id().context("Saved person has no id")?;
    let found = odm
        .query(PERSON)
        .filter(Filter::eq("_id", id))
        .select(Projection::parse_str("name friends stories")?)
        .populate(
            PopulateOptions::new("friends")
                .select(Projection::parse_str("name")?)
                .matching(Filter::parse(&doc! { "age": { "$gt": OLD_AGE } })?)
                .sort(SortSpec::from_document(&doc! { "name": -1 })?),
        )
        .populate(PopulateOptions::new("stories").select(Projection::parse_str("title t")?))
        .exec_one()
        .await
        .context("Populate query failed")?
        .context("Linked person disappeared")?;
    report.friends_resolved = array_len(&found, "friends");
    report.stories_resolved = array_len(&found, "stories");
    print_step(4, "person with populated friends and stories", &found.to_json());

    // 5. Kind-specific lookup
    let old = people::find_old_people(odm, OLD_AGE).await?;
    report.old_people = old.len();
    print_step(5, "find_old_people", &json_list(&old));

    // 6. Delete returning the removed document
    let deleted = odm
        .find_by_id_and_delete(PERSON, id)
        .await?
        .context("Person was already deleted")?;
    report.deleted = deleted.id();
    print_step(6, "find_by_id_and_delete", &deleted.to_json());

    // 7. Aggregation
    let pipeline = Pipeline::from_documents(&[
        doc! { "$project": { "name": 1, "age": 1, "gender": 1, "_id": 0 } },
        doc! { "$match": { "gender": { "$in": ["male", "female"] } } },
        doc! { "$skip": 5 },
        doc! { "$limit": 10 },
    ])?;
    let aggregated = odm.aggregate(PERSON, &pipeline).await?;
    report.aggregated = aggregated.len();
    print_step(
        7,
        "aggregate: project, match, skip, limit",
        &Bson::Array(aggregated.into_iter().map(Bson::Document).collect()).into_relaxed_extjson(),
    );

    Ok(report)
}
