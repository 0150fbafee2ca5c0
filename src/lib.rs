//! Databuilder
//!
//! A metadata ingestion pipeline: extract catalog records, reshape them into
//! graph-serializable models, stage them as files and publish them to Neo4j
//! or Elasticsearch.

pub mod cli;
pub mod client;
pub mod config;
pub mod elasticsearch;
pub mod etl;
pub mod extractors;
pub mod models;
pub mod neo4j;
pub mod rest_api;
pub mod storage;
pub mod transform;

// Re-exports for convenience
pub use client::{Auth, CypherRunner, ElasticsearchClient, Neo4jClient, SearchBackend};
pub use config::{ConfigTree, FromConfig, Scoped};
pub use elasticsearch::ElasticsearchPublisher;
pub use etl::{DefaultJob, DefaultTask, Extractor, Loader, Publisher, Task, Transformer};
pub use models::{GraphNode, GraphRecord, GraphRelationship, GraphSerializable, ModelClass};
pub use neo4j::{Neo4jCsvPublisher, Neo4jStalenessRemovalTask};
pub use storage::{FsElasticsearchJsonLoader, FsNeo4jCsvLoader, NdjsonReader, Neo4jCsvReader};
