//! Table last-updated timestamps

use super::de;
use super::graph::{GraphNode, GraphRelationship, GraphSerializable};
use super::table::{TABLE_NODE_LABEL, table_key};
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_NODE_LABEL: &str = "Timestamp";
pub const LAST_UPDATED_RELATION_TYPE: &str = "LAST_UPDATED_AT";
pub const LAST_UPDATED_REVERSE_RELATION_TYPE: &str = "LAST_UPDATED_TIME_OF";

const TIMESTAMP_NAME: &str = "last_updated_timestamp";

/// When a table's data last changed, in epoch seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableLastUpdated {
    #[serde(alias = "database", alias = "db_name")]
    pub db: String,
    pub cluster: String,
    pub schema: String,
    #[serde(alias = "name")]
    pub table_name: String,
    #[serde(deserialize_with = "de::lenient_i64")]
    pub last_updated_time_epoch: i64,
}

impl TableLastUpdated {
    pub fn new(
        db: impl Into<String>,
        cluster: impl Into<String>,
        schema: impl Into<String>,
        table_name: impl Into<String>,
        last_updated_time_epoch: i64,
    ) -> Self {
        Self {
            db: db.into(),
            cluster: cluster.into(),
            schema: schema.into(),
            table_name: table_name.into(),
            last_updated_time_epoch,
        }
    }

    fn table_key(&self) -> String {
        table_key(&self.db, &self.cluster, &self.schema, &self.table_name)
    }

    fn timestamp_key(&self) -> String {
        format!("{}/timestamp", self.table_key())
    }
}

impl GraphSerializable for TableLastUpdated {
    fn nodes(&self) -> Vec<GraphNode> {
        vec![
            GraphNode::new(self.timestamp_key(), TIMESTAMP_NODE_LABEL)
                .with_attribute(TIMESTAMP_NAME, self.last_updated_time_epoch)
                .with_attribute("name", TIMESTAMP_NAME),
        ]
    }

    fn relationships(&self) -> Vec<GraphRelationship> {
        vec![GraphRelationship::new(
            (TABLE_NODE_LABEL, &self.table_key()),
            (TIMESTAMP_NODE_LABEL, &self.timestamp_key()),
            LAST_UPDATED_RELATION_TYPE,
            LAST_UPDATED_REVERSE_RELATION_TYPE,
        )]
    }
}
