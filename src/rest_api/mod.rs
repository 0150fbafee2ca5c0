//! REST API query chains
//!
//! A chain starts with a [`RestApiQuerySeed`] and joins any number of
//! [`HttpRestApiQuery`] steps on top of it. Each step reads records from the
//! step below, uses their fields to build a request URL, and emits the input
//! record enriched with fields pulled out of the JSON response.
//!
//! ```text
//! seed {"org": "acme"}
//!   → GET /orgs/{org}/spaces      → {"org", "space_id"} per space
//!     → GET /spaces/{space_id}/tables → {"org", "space_id", "table"} per table
//! ```

mod config;
mod extractor;
mod json_path;
mod query;

pub use config::{PaginationConfig, RestApiChainConfig, RestApiQueryConfig};
pub use extractor::RestApiExtractor;
pub use json_path::JsonPath;
pub use query::{HttpRestApiQuery, Pagination, RestApiQuerySeed};

use async_trait::async_trait;
use eyre::Result;
use serde_json::{Map, Value};

/// A flat record flowing through a query chain
pub type Record = Map<String, Value>;

/// A pull-based source of records
#[async_trait]
pub trait RestApiQuery: Send {
    /// Next record, or `None` once the query is exhausted
    async fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Something that can fetch a JSON document for a URL
#[async_trait]
pub trait JsonSource: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;
}
