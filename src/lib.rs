//! Cypherlite - an embedded graph database over SQLite
//!
//! This crate provides graph storage and querying through:
//! - A schema catalog mapping node/relationship labels to property tables
//! - An openCypher subset parser (MATCH / WHERE / RETURN / LIMIT)
//! - A query planner translating graph patterns to SQL
//! - Row streaming through a caller-provided result handler

pub mod error;
pub mod graph_catalog;
pub mod graph_db;
pub mod graph_store;
pub mod open_cypher_parser;
pub mod query_planner;
pub mod sqlite_query_generator;
pub mod value;

pub use error::Error;
pub use graph_db::{ElementId, GraphDb, Overwrite, Parameters, ResultHandler, RowAction};
pub use graph_catalog::{ElementKind, PropertySchema};
pub use value::{Value, ValueList, ValueType};
