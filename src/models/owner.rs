//! Table ownership

use super::de;
use super::graph::{GraphNode, GraphRelationship, GraphSerializable};
use super::table::{TABLE_NODE_LABEL, table_key};
use serde::{Deserialize, Serialize};

pub const USER_NODE_LABEL: &str = "User";
pub const TABLE_OWNER_RELATION_TYPE: &str = "OWNER";
pub const OWNER_TABLE_RELATION_TYPE: &str = "OWNER_OF";

/// Owners of a table, identified by email
///
/// Each owner becomes a `User` node keyed by email. Blank owners are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOwner {
    #[serde(alias = "database", alias = "db")]
    pub db_name: String,
    pub cluster: String,
    pub schema: String,
    #[serde(alias = "name")]
    pub table_name: String,
    #[serde(default, deserialize_with = "de::lenient_list")]
    pub owners: Vec<String>,
}

impl TableOwner {
    pub fn new(
        db_name: impl Into<String>,
        cluster: impl Into<String>,
        schema: impl Into<String>,
        table_name: impl Into<String>,
        owners: Vec<String>,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            cluster: cluster.into(),
            schema: schema.into(),
            table_name: table_name.into(),
            owners,
        }
    }

    fn table_key(&self) -> String {
        table_key(&self.db_name, &self.cluster, &self.schema, &self.table_name)
    }

    fn owner_emails(&self) -> impl Iterator<Item = &str> {
        self.owners.iter().map(|o| o.trim()).filter(|o| !o.is_empty())
    }
}

impl GraphSerializable for TableOwner {
    fn nodes(&self) -> Vec<GraphNode> {
        self.owner_emails()
            .map(|email| GraphNode::new(email, USER_NODE_LABEL).with_attribute("email", email))
            .collect()
    }

    fn relationships(&self) -> Vec<GraphRelationship> {
        let table_key = self.table_key();
        self.owner_emails()
            .map(|email| {
                GraphRelationship::new(
                    (TABLE_NODE_LABEL, &table_key),
                    (USER_NODE_LABEL, email),
                    TABLE_OWNER_RELATION_TYPE,
                    OWNER_TABLE_RELATION_TYPE,
                )
            })
            .collect()
    }
}
