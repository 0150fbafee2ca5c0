//! Graph serialization primitives
//!
//! Catalog models describe themselves as a set of nodes and relationships.
//! The Neo4j CSV loader turns those into staged rows whose column names are
//! fixed by the constants below, and the publisher reads them back.

use serde_json::Value;
use std::collections::BTreeMap;

pub const NODE_KEY: &str = "KEY";
pub const NODE_LABEL: &str = "LABEL";

pub const RELATION_START_KEY: &str = "START_KEY";
pub const RELATION_START_LABEL: &str = "START_LABEL";
pub const RELATION_END_KEY: &str = "END_KEY";
pub const RELATION_END_LABEL: &str = "END_LABEL";
pub const RELATION_TYPE: &str = "TYPE";
pub const RELATION_REVERSE_TYPE: &str = "REVERSE_TYPE";

/// Header suffix marking a column whose cells are JSON literals, not strings
pub const UNQUOTED_SUFFIX: &str = ":UNQUOTED";

/// A node in the metadata graph, identified by `(label, key)`
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub key: String,
    pub label: String,
    pub attributes: BTreeMap<String, Value>,
}

impl GraphNode {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A directed relationship plus the name of its reverse edge
///
/// Every relationship is published in both directions so the graph can be
/// walked from either end.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRelationship {
    pub start_label: String,
    pub start_key: String,
    pub end_label: String,
    pub end_key: String,
    pub relationship_type: String,
    pub reverse_type: String,
    pub attributes: BTreeMap<String, Value>,
}

impl GraphRelationship {
    pub fn new(
        start: (&str, &str),
        end: (&str, &str),
        relationship_type: impl Into<String>,
        reverse_type: impl Into<String>,
    ) -> Self {
        Self {
            start_label: start.0.to_string(),
            start_key: start.1.to_string(),
            end_label: end.0.to_string(),
            end_key: end.1.to_string(),
            relationship_type: relationship_type.into(),
            reverse_type: reverse_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A record that can be published to the metadata graph
pub trait GraphSerializable: std::fmt::Debug {
    /// Nodes this record creates or updates
    fn nodes(&self) -> Vec<GraphNode>;

    /// Relationships this record creates or updates
    fn relationships(&self) -> Vec<GraphRelationship>;
}

/// Type-erased graph record flowing from transformers into the CSV loader
pub type GraphRecord = Box<dyn GraphSerializable + Send + Sync>;

/// Serialize a node into ordered `(header, cell)` pairs
pub fn serialize_node(node: &GraphNode) -> Vec<(String, String)> {
    let mut row = vec![
        (NODE_KEY.to_string(), node.key.clone()),
        (NODE_LABEL.to_string(), node.label.clone()),
    ];
    row.extend(serialize_attributes(&node.attributes));
    row
}

/// Serialize a relationship into ordered `(header, cell)` pairs
pub fn serialize_relationship(relationship: &GraphRelationship) -> Vec<(String, String)> {
    let mut row = vec![
        (
            RELATION_START_LABEL.to_string(),
            relationship.start_label.clone(),
        ),
        (RELATION_END_LABEL.to_string(), relationship.end_label.clone()),
        (RELATION_START_KEY.to_string(), relationship.start_key.clone()),
        (RELATION_END_KEY.to_string(), relationship.end_key.clone()),
        (
            RELATION_TYPE.to_string(),
            relationship.relationship_type.clone(),
        ),
        (
            RELATION_REVERSE_TYPE.to_string(),
            relationship.reverse_type.clone(),
        ),
    ];
    row.extend(serialize_attributes(&relationship.attributes));
    row
}

fn serialize_attributes(attributes: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    attributes
        .iter()
        .map(|(name, value)| match value {
            Value::String(s) => (name.clone(), s.clone()),
            Value::Null => (format!("{}{}", name, UNQUOTED_SUFFIX), String::new()),
            other => (format!("{}{}", name, UNQUOTED_SUFFIX), other.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_node_marks_typed_attributes() {
        let node = GraphNode::new("hive://gold.core/orders", "Table")
            .with_attribute("name", "orders")
            .with_attribute("is_view", false)
            .with_attribute("row_count", 42);

        let row = serialize_node(&node);
        assert_eq!(row[0], ("KEY".to_string(), "hive://gold.core/orders".to_string()));
        assert_eq!(row[1], ("LABEL".to_string(), "Table".to_string()));
        assert!(row.contains(&("is_view:UNQUOTED".to_string(), "false".to_string())));
        assert!(row.contains(&("row_count:UNQUOTED".to_string(), "42".to_string())));
        assert!(row.contains(&("name".to_string(), "orders".to_string())));
    }

    #[test]
    fn test_serialize_relationship_header_order() {
        let relationship = GraphRelationship::new(
            ("Table", "t"),
            ("Column", "t/c"),
            "COLUMN",
            "COLUMN_OF",
        )
        .with_attribute("weight", json!(null));

        let headers: Vec<String> = serialize_relationship(&relationship)
            .into_iter()
            .map(|(h, _)| h)
            .collect();
        assert_eq!(
            headers,
            vec![
                "START_LABEL",
                "END_LABEL",
                "START_KEY",
                "END_KEY",
                "TYPE",
                "REVERSE_TYPE",
                "weight:UNQUOTED"
            ]
        );
    }
}
