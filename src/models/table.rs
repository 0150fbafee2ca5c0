//! Table and column metadata
//!
//! A `TableMetadata` record fans out into the table node, its column nodes,
//! the description nodes for both, the database/cluster/schema hierarchy
//! above it and any tags attached to it.

use super::de;
use super::graph::{GraphNode, GraphRelationship, GraphSerializable};
use serde::{Deserialize, Serialize};

pub const TABLE_NODE_LABEL: &str = "Table";
pub const COLUMN_NODE_LABEL: &str = "Column";
pub const DESCRIPTION_NODE_LABEL: &str = "Description";
pub const SCHEMA_NODE_LABEL: &str = "Schema";
pub const CLUSTER_NODE_LABEL: &str = "Cluster";
pub const DATABASE_NODE_LABEL: &str = "Database";
pub const TAG_NODE_LABEL: &str = "Tag";

pub const TABLE_COLUMN_RELATION_TYPE: &str = "COLUMN";
pub const COLUMN_TABLE_RELATION_TYPE: &str = "COLUMN_OF";
pub const DESCRIPTION_RELATION_TYPE: &str = "DESCRIPTION";
pub const DESCRIPTION_REVERSE_RELATION_TYPE: &str = "DESCRIPTION_OF";
pub const SCHEMA_TABLE_RELATION_TYPE: &str = "TABLE";
pub const TABLE_SCHEMA_RELATION_TYPE: &str = "TABLE_OF";
pub const CLUSTER_SCHEMA_RELATION_TYPE: &str = "SCHEMA";
pub const SCHEMA_CLUSTER_RELATION_TYPE: &str = "SCHEMA_OF";
pub const DATABASE_CLUSTER_RELATION_TYPE: &str = "CLUSTER";
pub const CLUSTER_DATABASE_RELATION_TYPE: &str = "CLUSTER_OF";
pub const TABLE_TAG_RELATION_TYPE: &str = "TAGGED_BY";
pub const TAG_TABLE_RELATION_TYPE: &str = "TAG";

/// Key of a table node: `{db}://{cluster}.{schema}/{table}`
pub fn table_key(database: &str, cluster: &str, schema: &str, table: &str) -> String {
    format!("{}://{}.{}/{}", database, cluster, schema, table)
}

pub fn schema_key(database: &str, cluster: &str, schema: &str) -> String {
    format!("{}://{}.{}", database, cluster, schema)
}

pub fn cluster_key(database: &str, cluster: &str) -> String {
    format!("{}://{}", database, cluster)
}

pub fn database_key(database: &str) -> String {
    format!("database://{}", database)
}

fn description_key(owner_key: &str) -> String {
    format!("{}/_description", owner_key)
}

/// A column of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub description: Option<String>,
    #[serde(default, alias = "type")]
    pub col_type: String,
    #[serde(default, alias = "col_sort_order", deserialize_with = "de::lenient_i64_or_zero")]
    pub sort_order: i64,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, col_type: impl Into<String>, sort_order: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            col_type: col_type.into(),
            sort_order,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A table together with its columns, description and tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(alias = "db", alias = "db_name")]
    pub database: String,
    pub cluster: String,
    pub schema: String,
    #[serde(alias = "table_name")]
    pub name: String,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default, deserialize_with = "de::lenient_bool")]
    pub is_view: bool,
    #[serde(default, deserialize_with = "de::lenient_list")]
    pub tags: Vec<String>,
}

impl TableMetadata {
    pub fn new(
        database: impl Into<String>,
        cluster: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            cluster: cluster.into(),
            schema: schema.into(),
            name: name.into(),
            description: None,
            columns: Vec::new(),
            is_view: false,
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnMetadata>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn key(&self) -> String {
        table_key(&self.database, &self.cluster, &self.schema, &self.name)
    }

    fn column_key(&self, column: &ColumnMetadata) -> String {
        format!("{}/{}", self.key(), column.name)
    }
}

impl GraphSerializable for TableMetadata {
    fn nodes(&self) -> Vec<GraphNode> {
        let table_key = self.key();
        let mut nodes = vec![
            GraphNode::new(&table_key, TABLE_NODE_LABEL)
                .with_attribute("name", self.name.as_str())
                .with_attribute("is_view", self.is_view),
        ];

        if let Some(description) = &self.description {
            nodes.push(
                GraphNode::new(description_key(&table_key), DESCRIPTION_NODE_LABEL)
                    .with_attribute("description", description.as_str()),
            );
        }

        for tag in &self.tags {
            nodes.push(GraphNode::new(tag, TAG_NODE_LABEL).with_attribute("tag_type", "default"));
        }

        for column in &self.columns {
            let column_key = self.column_key(column);
            nodes.push(
                GraphNode::new(&column_key, COLUMN_NODE_LABEL)
                    .with_attribute("name", column.name.as_str())
                    .with_attribute("col_type", column.col_type.as_str())
                    .with_attribute("sort_order", column.sort_order),
            );
            if let Some(description) = &column.description {
                nodes.push(
                    GraphNode::new(description_key(&column_key), DESCRIPTION_NODE_LABEL)
                        .with_attribute("description", description.as_str()),
                );
            }
        }

        nodes.push(
            GraphNode::new(database_key(&self.database), DATABASE_NODE_LABEL)
                .with_attribute("name", self.database.as_str()),
        );
        nodes.push(
            GraphNode::new(
                cluster_key(&self.database, &self.cluster),
                CLUSTER_NODE_LABEL,
            )
            .with_attribute("name", self.cluster.as_str()),
        );
        nodes.push(
            GraphNode::new(
                schema_key(&self.database, &self.cluster, &self.schema),
                SCHEMA_NODE_LABEL,
            )
            .with_attribute("name", self.schema.as_str()),
        );

        nodes
    }

    fn relationships(&self) -> Vec<GraphRelationship> {
        let table_key = self.key();
        let database_key = database_key(&self.database);
        let cluster_key = cluster_key(&self.database, &self.cluster);
        let schema_key = schema_key(&self.database, &self.cluster, &self.schema);

        let mut relationships = Vec::new();

        if self.description.is_some() {
            relationships.push(GraphRelationship::new(
                (TABLE_NODE_LABEL, &table_key),
                (DESCRIPTION_NODE_LABEL, &description_key(&table_key)),
                DESCRIPTION_RELATION_TYPE,
                DESCRIPTION_REVERSE_RELATION_TYPE,
            ));
        }

        for tag in &self.tags {
            relationships.push(GraphRelationship::new(
                (TABLE_NODE_LABEL, &table_key),
                (TAG_NODE_LABEL, tag),
                TABLE_TAG_RELATION_TYPE,
                TAG_TABLE_RELATION_TYPE,
            ));
        }

        for column in &self.columns {
            let column_key = self.column_key(column);
            relationships.push(GraphRelationship::new(
                (TABLE_NODE_LABEL, &table_key),
                (COLUMN_NODE_LABEL, &column_key),
                TABLE_COLUMN_RELATION_TYPE,
                COLUMN_TABLE_RELATION_TYPE,
            ));
            if column.description.is_some() {
                relationships.push(GraphRelationship::new(
                    (COLUMN_NODE_LABEL, &column_key),
                    (DESCRIPTION_NODE_LABEL, &description_key(&column_key)),
                    DESCRIPTION_RELATION_TYPE,
                    DESCRIPTION_REVERSE_RELATION_TYPE,
                ));
            }
        }

        relationships.push(GraphRelationship::new(
            (DATABASE_NODE_LABEL, &database_key),
            (CLUSTER_NODE_LABEL, &cluster_key),
            DATABASE_CLUSTER_RELATION_TYPE,
            CLUSTER_DATABASE_RELATION_TYPE,
        ));
        relationships.push(GraphRelationship::new(
            (CLUSTER_NODE_LABEL, &cluster_key),
            (SCHEMA_NODE_LABEL, &schema_key),
            CLUSTER_SCHEMA_RELATION_TYPE,
            SCHEMA_CLUSTER_RELATION_TYPE,
        ));
        relationships.push(GraphRelationship::new(
            (SCHEMA_NODE_LABEL, &schema_key),
            (TABLE_NODE_LABEL, &table_key),
            SCHEMA_TABLE_RELATION_TYPE,
            TABLE_SCHEMA_RELATION_TYPE,
        ));

        relationships
    }
}
