//! File system staging
//!
//! Loaders stage records on disk and publishers read them back:
//! - Neo4j CSV node and relationship files
//! - NDJSON search documents
//! - Cleanup of staging paths after a successful publish

mod cleanup;
mod neo4j_csv;
mod ndjson;

pub use cleanup::CleanupStagingCallback;
pub use ndjson::{FsElasticsearchJsonLoader, NdjsonReader};
pub use neo4j_csv::{FsNeo4jCsvLoader, Neo4jCsvReader};
