//! Integration tests for the Odm facade against the in-memory store.
//!
//! The last test talks to a real MongoDB server and is ignored by default.
//! Run it with `--ignored` and MONGODB_URL pointing at a disposable database.

use bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use docmap_mongodb::{
    Connection, ConnectionEvent, ConnectionEvents, DocMapError, ErrorType, FieldDefinition, Filter,
    MemoryStore, MongoStore, Odm, Pipeline, PoolConfig, PopulateOptions, Projection,
    RegexValidator, Schema, SortSpec,
};

fn person_schema() -> Schema {
    Schema::builder()
        .field(FieldDefinition::string("name").required())
        .field(FieldDefinition::number("age").required().index())
        .field(FieldDefinition::enumeration("gender", ["male", "female", "middle"]))
        .field(FieldDefinition::references("friends", "Person"))
        .field(FieldDefinition::references("stories", "Story"))
        .field(FieldDefinition::nested(
            "contacts",
            vec![
                FieldDefinition::string("wx"),
                FieldDefinition::string("tel")
                    .required_with("Phone number is required")
                    .validate(
                        RegexValidator::new(r"\d{3}-\d{3}-\d{4}", "{VALUE} is not a valid phone number!")
                            .unwrap(),
                    ),
            ],
        ))
        .virtual_field("is_old", |doc| {
            Bson::Boolean(doc.get("age").and_then(Bson::as_i32).map(|a| a > 18).unwrap_or(false))
        })
        .build()
        .unwrap()
}

fn story_schema() -> Schema {
    Schema::builder()
        .field(FieldDefinition::reference("author", "Person"))
        .field(FieldDefinition::string("t").alias("title"))
        .field(FieldDefinition::references("fans", "Person"))
        .build()
        .unwrap()
}

fn odm() -> Odm {
    let odm = Odm::with_store(MemoryStore::new());
    odm.register("Person", person_schema()).unwrap();
    odm.register("Story", story_schema()).unwrap();
    odm
}

fn person(name: &str, age: i32) -> BsonDocument {
    doc! {
        "name": name,
        "age": age,
        "gender": if age % 2 == 0 { "male" } else { "female" },
        "contacts": { "tel": "555-123-4567" },
    }
}

fn names(values: &[Bson]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_document())
        .filter_map(|d| d.get_str("name").ok())
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_missing_required_field_is_reported() {
    let odm = odm();
    let err = odm
        .validate("Person", &doc! { "name": "Amy", "contacts": { "tel": "555-123-4567" } })
        .unwrap_err();

    let DocMapError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert!(errors.has_path("age"));
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn test_validation_collects_every_failure() {
    let odm = odm();
    let err = odm
        .insert(
            "Person",
            doc! { "gender": "robot", "contacts": { "tel": "12345" }, "friends": [ObjectId::new(), "x"] },
        )
        .await
        .unwrap_err();

    let DocMapError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert!(errors.has_path("name"));
    assert!(errors.has_path("age"));
    assert!(errors.has_path("gender"));
    assert!(errors.has_path("friends.1"));

    let tel: Vec<_> = errors.for_path("contacts.tel").collect();
    assert_eq!(tel.len(), 1);
    assert_eq!(tel[0].error_type, ErrorType::ValidatorFailed);
    assert_eq!(tel[0].message, "12345 is not a valid phone number!");
}

#[tokio::test]
async fn test_missing_nested_required_uses_custom_message() {
    let odm = odm();
    let err = odm
        .insert("Person", doc! { "name": "Amy", "age": 17 })
        .await
        .unwrap_err();

    let DocMapError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    let tel: Vec<_> = errors.for_path("contacts.tel").collect();
    assert_eq!(tel.len(), 1);
    assert_eq!(tel[0].message, "Phone number is required");
}

#[tokio::test]
async fn test_insert_many_with_invalid_item_persists_nothing() {
    let odm = odm();
    let mut batch: Vec<BsonDocument> = (0..5).map(|i| person(&format!("p{}", i), 20 + i)).collect();
    batch[3].remove("name");

    let err = odm.insert_many("Person", batch).await.unwrap_err();
    assert!(matches!(err, DocMapError::BatchValidation { .. }));
    assert_eq!(err.batch_indices(), vec![3]);
    assert!(err.is_recoverable());
    assert_eq!(odm.count("Person", &Filter::All).await.unwrap(), 0);
}

#[tokio::test]
async fn test_insert_many_names_every_invalid_index() {
    let odm = odm();
    let mut batch: Vec<BsonDocument> = (0..4).map(|i| person(&format!("p{}", i), 20 + i)).collect();
    batch[0].insert("gender", "unknown");
    batch[2].remove("age");

    let err = odm.insert_many("Person", batch).await.unwrap_err();
    assert_eq!(err.batch_indices(), vec![0, 2]);
    assert_eq!(odm.count("Person", &Filter::All).await.unwrap(), 0);
}

#[tokio::test]
async fn test_insert_many_write_failure_waits_for_siblings() {
    let odm = odm();
    let existing = odm.insert("Person", person("Old", 40)).await.unwrap();

    let mut duplicate = person("Dup", 41);
    duplicate.insert("_id", existing.id().unwrap());
    let batch = vec![person("A", 21), duplicate, person("B", 22)];

    let err = odm.insert_many("Person", batch).await.unwrap_err();
    assert!(matches!(err, DocMapError::BatchWrite { .. }));
    assert_eq!(err.batch_indices(), vec![1]);
    assert_eq!(odm.count("Person", &Filter::All).await.unwrap(), 3);
}

#[tokio::test]
async fn test_populate_deleted_reference_leaves_empty_slot() {
    let odm = odm();
    let people = odm
        .insert_many("Person", vec![person("Ann", 30), person("Ben", 31)])
        .await
        .unwrap();
    let (ann, ben) = (people[0].id().unwrap(), people[1].id().unwrap());

    let stories = odm
        .insert_many(
            "Story",
            vec![
                doc! { "title": "first", "author": ben, "fans": [ben, ann] },
                doc! { "title": "second", "author": ann, "fans": [ann] },
            ],
        )
        .await
        .unwrap();
    assert_eq!(stories[0].get("t"), Some(&Bson::String("first".into())));

    odm.delete_by_id("Person", ben).await.unwrap();

    let resolved = odm
        .query("Story")
        .sort(SortSpec::asc("t"))
        .populate("author")
        .populate("fans")
        .exec()
        .await
        .unwrap();

    assert_eq!(resolved[0].get("author"), Some(&Bson::Null));
    let fans = resolved[0].get("fans").and_then(Bson::as_array).unwrap();
    assert_eq!(names(fans), vec!["Ann"]);

    let author = resolved[1].get("author").and_then(Bson::as_document).unwrap();
    assert_eq!(author.get_str("name").unwrap(), "Ann");
}

#[tokio::test]
async fn test_chained_populate_resolves_independently() {
    let odm = odm();
    let friends = odm
        .insert_many("Person", vec![person("Zed", 40), person("Kid", 12), person("Max", 33)])
        .await
        .unwrap();
    let friend_ids: Vec<ObjectId> = friends.iter().filter_map(|f| f.id()).collect();

    let mut amy = odm.insert("Person", person("Amy", 17)).await.unwrap();
    let story = odm
        .insert("Story", doc! { "title": "hello", "author": amy.id().unwrap() })
        .await
        .unwrap();
    amy.set("friends", friend_ids.clone());
    amy.set("stories", vec![story.id().unwrap()]);
    odm.save(&mut amy).await.unwrap();

    let friends_options = PopulateOptions::new("friends")
        .select(Projection::parse_str("name").unwrap())
        .matching(Filter::gt("age", 18))
        .sort(SortSpec::desc("name"));

    let friends_only = odm
        .query("Person")
        .filter(Filter::eq("_id", amy.id().unwrap()))
        .select_str("name friends stories")
        .populate(friends_options.clone())
        .exec_one()
        .await
        .unwrap()
        .unwrap();

    let both = odm
        .query("Person")
        .filter(Filter::eq("_id", amy.id().unwrap()))
        .select_str("name friends stories")
        .populate(friends_options)
        .populate(PopulateOptions::new("stories").select(Projection::parse_str("title t").unwrap()))
        .exec_one()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(both.get("friends"), friends_only.get("friends"));
    let resolved_friends = both.get("friends").and_then(Bson::as_array).unwrap();
    assert_eq!(names(resolved_friends), vec!["Zed", "Max"]);

    let stories = both.get("stories").and_then(Bson::as_array).unwrap();
    let first = stories[0].as_document().unwrap();
    assert_eq!(first.get_str("t").unwrap(), "hello");
    assert!(first.get("author").is_none());
    assert!(both.get("age").is_none());
}

#[tokio::test]
async fn test_save_then_find_by_id_round_trips() {
    let odm = odm();
    let mut amy = odm.insert("Person", person("Amy", 17)).await.unwrap();
    amy.set("age", 18);
    amy.set("contacts.wx", "amy_wx");
    odm.save(&mut amy).await.unwrap();

    let found = odm.find_by_id("Person", amy.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(found.data(), amy.data());
    assert_eq!(found.get("contacts.wx"), Some(&Bson::String("amy_wx".into())));
    assert_eq!(found.get("__v"), Some(&Bson::Int32(1)));
}

#[tokio::test]
async fn test_save_nested_selection_merges_into_stored() {
    let odm = odm();
    let friend = odm.insert("Person", person("Bob", 40)).await.unwrap();
    let mut amy = odm.insert("Person", person("Amy", 17)).await.unwrap();
    amy.set("contacts.wx", "amy_wx");
    amy.set("friends", vec![friend.id().unwrap()]);
    odm.save(&mut amy).await.unwrap();

    let mut partial = odm
        .query("Person")
        .filter(Filter::eq("_id", amy.id().unwrap()))
        .select_str("contacts.tel")
        .exec_one()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partial.get("contacts.wx"), None);
    partial.set("contacts.tel", "555-765-4321");
    odm.save(&mut partial).await.unwrap();

    let found = odm.find_by_id("Person", amy.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(found.get("contacts.tel"), Some(&Bson::String("555-765-4321".into())));
    assert_eq!(found.get("contacts.wx"), Some(&Bson::String("amy_wx".into())));
    assert_eq!(found.get("name"), Some(&Bson::String("Amy".into())));
    assert_eq!(
        found.get("friends"),
        Some(&Bson::Array(vec![Bson::ObjectId(friend.id().unwrap())]))
    );
    assert_eq!(found.get("__v"), Some(&Bson::Int32(2)));
}

#[tokio::test]
async fn test_amy_example() {
    let odm = Odm::with_store(MemoryStore::new());
    odm.register(
        "Person",
        Schema::builder()
            .field(FieldDefinition::string("name"))
            .field(FieldDefinition::number("age").required())
            .field(FieldDefinition::references("friends", "Person"))
            .build()
            .unwrap(),
    )
    .unwrap();

    assert!(odm.validate("Person", &doc! { "name": "Amy" }).is_err());
    odm.validate("Person", &doc! { "name": "Amy", "age": 17 }).unwrap();

    odm.insert("Person", doc! { "name": "Amy", "age": 17 }).await.unwrap();
    let found = odm
        .find("Person", Filter::eq("name", "Amy"), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name"), Some(&Bson::String("Amy".into())));
}

#[tokio::test]
async fn test_strict_mode_and_virtuals() {
    let odm = odm();
    let amy = odm
        .insert("Person", {
            let mut d = person("Amy", 19);
            d.insert("nickname", "ames");
            d
        })
        .await
        .unwrap();

    assert!(amy.get("nickname").is_none());
    assert!(amy.data().get("is_old").is_none());
    assert_eq!(amy.with_virtuals().get("is_old"), Some(&Bson::Boolean(true)));
    assert_eq!(amy.to_json()["is_old"], serde_json::Value::Bool(true));
}

#[tokio::test]
async fn test_aggregate_tutorial_pipeline() {
    let odm = odm();
    let mut batch: Vec<BsonDocument> = (0..8).map(|i| person(&format!("p{}", i), 20 + i)).collect();
    batch[7].insert("gender", "middle");
    odm.insert_many("Person", batch).await.unwrap();

    let pipeline = Pipeline::from_documents(&[
        doc! { "$project": { "name": 1, "age": 1, "gender": 1, "_id": 0 } },
        doc! { "$match": { "gender": { "$in": ["male", "female"] } } },
        doc! { "$skip": 5 },
        doc! { "$limit": 10 },
    ])
    .unwrap();

    let results = odm.aggregate("Person", &pipeline).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], doc! { "name": "p5", "age": 25, "gender": "female" });
    assert!(results.iter().all(|d| d.get("_id").is_none()));
}

#[tokio::test]
async fn test_find_by_id_and_delete() {
    let odm = odm();
    let amy = odm.insert("Person", person("Amy", 17)).await.unwrap();

    let removed = odm
        .find_by_id_and_delete("Person", amy.id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(removed.data(), amy.data());
    assert!(odm.find_by_id("Person", amy.id().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_and_unknown_kinds() {
    let odm = odm();
    assert!(matches!(
        odm.register("Person", person_schema()),
        Err(DocMapError::DuplicateKind(_))
    ));
    assert!(matches!(
        odm.query("Comment").exec().await,
        Err(DocMapError::UnknownKind(_))
    ));
}

#[tokio::test]
#[ignore] // Only run with --ignored flag when MongoDB is available
async fn test_mongodb_store_end_to_end() {
    let url = std::env::var("MONGODB_URL")
        .unwrap_or_else(|_| "mongodb://127.0.0.1:27017/docmap_test".to_string());

    let events = ConnectionEvents::default();
    let mut rx = events.subscribe();
    let conn = Connection::connect(&url, PoolConfig::default(), events)
        .await
        .unwrap();
    assert!(matches!(rx.recv().await, Ok(ConnectionEvent::Connected { .. })));
    conn.drop_database().await.unwrap();

    let odm = Odm::with_store(MongoStore::from_connection(&conn));
    odm.register("Person", person_schema()).unwrap();
    odm.register("Story", story_schema()).unwrap();
    odm.ensure_indexes("Person").await.unwrap();

    let people = odm
        .insert_many("Person", vec![person("Ann", 30), person("Ben", 12)])
        .await
        .unwrap();
    let mut ann = people[0].clone();
    ann.set("friends", vec![people[1].id().unwrap()]);
    odm.save(&mut ann).await.unwrap();

    let found = odm
        .query("Person")
        .filter(Filter::eq("name", "Ann"))
        .populate("friends")
        .exec_one()
        .await
        .unwrap()
        .unwrap();
    let friends = found.get("friends").and_then(Bson::as_array).unwrap();
    assert_eq!(names(friends), vec!["Ben"]);

    let counted = odm
        .aggregate("Person", &Pipeline::new().count("total"))
        .await
        .unwrap();
    assert_eq!(counted[0].get("total").and_then(Bson::as_i32), Some(2));

    conn.close().await;
    assert!(matches!(rx.recv().await, Ok(ConnectionEvent::Disconnected { .. })));
}
