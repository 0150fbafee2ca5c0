//! Neo4j publishing, extraction and staleness removal
//!
//! Staged CSV files are published through the HTTP transactional API with
//! parameterized Cypher. Every node and relationship written carries the
//! job's `published_tag` and a `publisher_last_updated_epoch_ms` stamp, which
//! [`Neo4jStalenessRemovalTask`] uses to find entities a later publish no
//! longer refreshes.

pub mod cypher;
mod extractor;
mod publisher;
mod staleness;

pub use extractor::Neo4jExtractor;
pub use publisher::{
    DEFAULT_PROGRESS_REPORT_FREQUENCY, DEFAULT_TRANSACTION_SIZE, Neo4jCsvPublisher,
    RelationPreprocessor,
};
pub use staleness::{
    DEFAULT_BATCH_SIZE, DEFAULT_MIN_MS_TO_EXPIRE, DEFAULT_STALENESS_MAX_PCT,
    Neo4jStalenessRemovalTask, StalenessReport, StalenessStat, TargetKind,
};
