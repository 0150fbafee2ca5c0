//! Catalog data models and their graph serialization
//!
//! Every model implements [`GraphSerializable`], describing the nodes and
//! relationships it contributes to the metadata graph.

pub mod de;
mod graph;
mod last_updated;
mod owner;
mod table;

pub use graph::{
    GraphNode, GraphRecord, GraphRelationship, GraphSerializable, NODE_KEY, NODE_LABEL,
    RELATION_END_KEY, RELATION_END_LABEL, RELATION_REVERSE_TYPE, RELATION_START_KEY,
    RELATION_START_LABEL, RELATION_TYPE, UNQUOTED_SUFFIX, serialize_node, serialize_relationship,
};
pub use last_updated::TableLastUpdated;
pub use owner::TableOwner;
pub use table::{ColumnMetadata, TableMetadata, table_key};

use eyre::{Context, Result};
use serde_json::Value;
use std::str::FromStr;

/// Names a model that dict records can be converted into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelClass {
    TableMetadata,
    TableOwner,
    TableLastUpdated,
}

impl ModelClass {
    /// Deserialize a dict record into this model
    ///
    /// # Errors
    /// Returns an error if required fields are missing or malformed
    pub fn from_record(&self, record: Value) -> Result<GraphRecord> {
        let model: GraphRecord = match self {
            Self::TableMetadata => Box::new(
                serde_json::from_value::<TableMetadata>(record)
                    .with_context(|| format!("Failed to build {}", self))?,
            ),
            Self::TableOwner => Box::new(
                serde_json::from_value::<TableOwner>(record)
                    .with_context(|| format!("Failed to build {}", self))?,
            ),
            Self::TableLastUpdated => Box::new(
                serde_json::from_value::<TableLastUpdated>(record)
                    .with_context(|| format!("Failed to build {}", self))?,
            ),
        };
        Ok(model)
    }
}

impl FromStr for ModelClass {
    type Err = eyre::Report;

    /// Accepts snake_case names, CamelCase names, or dotted paths ending in either
    fn from_str(s: &str) -> Result<Self> {
        let name = s.rsplit('.').next().unwrap_or(s).replace('_', "").to_lowercase();
        match name.as_str() {
            "tablemetadata" => Ok(Self::TableMetadata),
            "tableowner" => Ok(Self::TableOwner),
            "tablelastupdated" => Ok(Self::TableLastUpdated),
            _ => eyre::bail!(
                "Unknown model class '{}', expected one of: table_metadata, table_owner, table_last_updated",
                s
            ),
        }
    }
}

impl std::fmt::Display for ModelClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TableMetadata => write!(f, "table_metadata"),
            Self::TableOwner => write!(f, "table_owner"),
            Self::TableLastUpdated => write!(f, "table_last_updated"),
        }
    }
}
