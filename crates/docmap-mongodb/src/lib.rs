//! Schema-driven document mapping for MongoDB
//!
//! Kinds are registered with a [`Schema`]; the [`Odm`] facade validates every
//! write against it before delegating storage to a [`DocumentStore`].
//!
//! # Features
//! - Field types, required/default/alias options and custom validators
//! - Validation that reports every failing field at once
//! - Batched reference population with select/match/sort options
//! - Aggregation pipelines (`$project`, `$match`, `$skip`, `$limit`, `$sort`, `$count`)
//! - In-memory and MongoDB stores behind one async trait
//! - Connection lifecycle events on a broadcast channel

pub mod aggregate;
pub mod connection;
pub mod filter;
pub mod model;
pub mod names;
pub mod populate;
pub mod projection;
pub mod query;
pub mod registry;
pub mod schema;
pub mod sort;
pub mod store;
pub mod validation;
pub mod value;

pub use aggregate::{Pipeline, Stage};
pub use connection::{Connection, ConnectionEvent, ConnectionEvents, PoolConfig};
pub use docmap_common::{
    BatchFailure, DocMapError, ErrorType, Result, ValidationError, ValidationErrors,
};
pub use filter::{Condition, Filter};
pub use model::{ModelDocument, Odm};
pub use names::{validate_field_name, ValidatedCollectionName};
pub use populate::{PopulateOptions, Populator};
pub use projection::Projection;
pub use query::Query;
pub use registry::{Model, SchemaRegistry};
pub use schema::{
    FieldDefinition, FieldType, IndexSpec, Schema, SchemaBuilder, SchemaOptions,
    TimestampOptions, VirtualField, ID_FIELD,
};
pub use sort::{SortDirection, SortSpec};
pub use store::{DocumentStore, FindOptions, MemoryStore, MongoStore};
pub use validation::{FieldValidator, FnFieldValidator, RegexValidator};
