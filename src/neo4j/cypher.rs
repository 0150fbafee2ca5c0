//! Cypher statement builders
//!
//! Labels and relationship types cannot be parameters in Cypher, so they are
//! checked against a plain identifier pattern before being interpolated.
//! Every value goes through `parameters`.

use crate::client::Statement;
use eyre::Result;
use regex::Regex;
use semver::Version;
use serde_json::{Map, Value};
use std::sync::LazyLock;

pub const PUBLISHED_TAG_PROPERTY: &str = "published_tag";
pub const LAST_UPDATED_EPOCH_MS_PROPERTY: &str = "publisher_last_updated_epoch_ms";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Check a label or relationship type before it is interpolated into Cypher
pub fn validate_identifier<'a>(kind: &str, value: &'a str) -> Result<&'a str> {
    if IDENTIFIER.is_match(value) {
        Ok(value)
    } else {
        eyre::bail!("Invalid {} '{}': expected letters, digits and underscores", kind, value)
    }
}

/// `IF NOT EXISTS` constraints and the `FOR ... REQUIRE` syntax arrived in 4.4
fn supports_modern_constraints(version: Option<&Version>) -> bool {
    version.is_none_or(|v| *v >= Version::new(4, 4, 0))
}

/// Unique constraint on `key` for a node label
pub fn create_constraint(label: &str, version: Option<&Version>) -> Result<Statement> {
    let label = validate_identifier("label", label)?;
    let statement = if supports_modern_constraints(version) {
        format!("CREATE CONSTRAINT IF NOT EXISTS FOR (node:{label}) REQUIRE node.key IS UNIQUE")
    } else {
        format!("CREATE CONSTRAINT ON (node:{label}) ASSERT node.key IS UNIQUE")
    };
    Ok(Statement::new(statement))
}

/// Whether a constraint failure only means it was already in place
pub fn is_existing_constraint_error(message: &str) -> bool {
    message.contains("EquivalentSchemaRuleAlreadyExists")
        || message.contains("already exists")
}

fn stamp(variable: &str, properties: &str) -> String {
    format!(
        "{variable} += ${properties}, {variable}.{PUBLISHED_TAG_PROPERTY} = $publish_tag, \
         {variable}.{LAST_UPDATED_EPOCH_MS_PROPERTY} = timestamp()"
    )
}

/// Upsert a node by label and key
///
/// Create-only nodes keep their existing properties when matched.
pub fn merge_node(
    label: &str,
    key: &str,
    properties: Map<String, Value>,
    publish_tag: &str,
    create_only: bool,
) -> Result<Statement> {
    let label = validate_identifier("label", label)?;
    let mut statement = format!(
        "MERGE (node:{label} {{key: $key}})\nON CREATE SET {}",
        stamp("node", "props")
    );
    if !create_only {
        statement.push_str(&format!("\nON MATCH SET {}", stamp("node", "props")));
    }

    Ok(Statement::new(statement)
        .with_param("key", key)
        .with_param("props", properties)
        .with_param("publish_tag", publish_tag))
}

/// Endpoints and types of a relationship row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEnds<'a> {
    pub start_label: &'a str,
    pub start_key: &'a str,
    pub end_label: &'a str,
    pub end_key: &'a str,
    pub relation_type: &'a str,
    pub reverse_type: &'a str,
}

impl RelationEnds<'_> {
    fn validate(&self) -> Result<()> {
        validate_identifier("label", self.start_label)?;
        validate_identifier("label", self.end_label)?;
        validate_identifier("relationship type", self.relation_type)?;
        validate_identifier("relationship type", self.reverse_type)?;
        Ok(())
    }
}

/// Upsert a relationship and its reverse between two existing nodes
///
/// Returns one row when both endpoints exist and none otherwise.
pub fn merge_relation(
    ends: &RelationEnds<'_>,
    properties: Map<String, Value>,
    publish_tag: &str,
) -> Result<Statement> {
    ends.validate()?;
    let statement = format!(
        "MATCH (n1:{start} {{key: $start_key}}), (n2:{end} {{key: $end_key}})\n\
         MERGE (n1)-[r1:{rel}]->(n2)-[r2:{rev}]->(n1)\n\
         SET {}, {}\n\
         RETURN n1.key AS start_key, n2.key AS end_key",
        stamp("r1", "props"),
        stamp("r2", "props"),
        start = ends.start_label,
        end = ends.end_label,
        rel = ends.relation_type,
        rev = ends.reverse_type,
    );

    Ok(Statement::new(statement)
        .with_param("start_key", ends.start_key)
        .with_param("end_key", ends.end_key)
        .with_param("props", properties)
        .with_param("publish_tag", publish_tag))
}

/// Remove every relationship of this type (and its reverse) from the start node
pub fn delete_relations_from(ends: &RelationEnds<'_>) -> Result<Statement> {
    ends.validate()?;
    let statement = format!(
        "MATCH (n1:{start} {{key: $start_key}})-[r1:{rel}]->(n2:{end})\n\
         OPTIONAL MATCH (n2)-[r2:{rev}]->(n1)\n\
         DELETE r1, r2\n\
         RETURN count(*) AS count",
        start = ends.start_label,
        end = ends.end_label,
        rel = ends.relation_type,
        rev = ends.reverse_type,
    );
    Ok(Statement::new(statement).with_param("start_key", ends.start_key))
}

/// Whether staleness is judged by publish tag or by age
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StalenessMarker {
    /// Stale when `published_tag` is older than this tag
    PublishTag(String),
    /// Stale when last updated more than this many milliseconds ago
    ExpireMs(u64),
}

impl StalenessMarker {
    fn condition(&self) -> String {
        match self {
            Self::PublishTag(_) => format!(
                "(target.{PUBLISHED_TAG_PROPERTY} < $marker OR target.{PUBLISHED_TAG_PROPERTY} IS NULL)"
            ),
            Self::ExpireMs(_) => format!(
                "(target.{LAST_UPDATED_EPOCH_MS_PROPERTY} < (timestamp() - $marker) \
                 OR target.{LAST_UPDATED_EPOCH_MS_PROPERTY} IS NULL)"
            ),
        }
    }

    fn value(&self) -> Value {
        match self {
            Self::PublishTag(tag) => Value::from(tag.as_str()),
            Self::ExpireMs(ms) => Value::from(*ms),
        }
    }
}

/// A node label or relationship type targeted by staleness removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Node(&'a str),
    Relation(&'a str),
}

impl Target<'_> {
    fn pattern(&self) -> Result<String> {
        Ok(match self {
            Self::Node(label) => format!("(target:{})", validate_identifier("label", label)?),
            Self::Relation(kind) => format!(
                "()-[target:{}]->()",
                validate_identifier("relationship type", kind)?
            ),
        })
    }
}

pub fn count_total(target: Target<'_>) -> Result<Statement> {
    Ok(Statement::new(format!(
        "MATCH {} RETURN count(*) AS count",
        target.pattern()?
    )))
}

pub fn count_stale(target: Target<'_>, marker: &StalenessMarker) -> Result<Statement> {
    Ok(Statement::new(format!(
        "MATCH {} WHERE {} RETURN count(*) AS count",
        target.pattern()?,
        marker.condition()
    ))
    .with_param("marker", marker.value()))
}

/// Delete up to `batch_size` stale entities, returning how many went
pub fn delete_stale(target: Target<'_>, marker: &StalenessMarker, batch_size: u64) -> Result<Statement> {
    let delete = match target {
        Target::Node(_) => "DETACH DELETE target",
        Target::Relation(_) => "DELETE target",
    };
    Ok(Statement::new(format!(
        "MATCH {} WHERE {}\nWITH target LIMIT $batch_size\n{}\nRETURN count(*) AS count",
        target.pattern()?,
        marker.condition(),
        delete
    ))
    .with_param("marker", marker.value())
    .with_param("batch_size", batch_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ends() -> RelationEnds<'static> {
        RelationEnds {
            start_label: "Table",
            start_key: "hive://gold.core/orders",
            end_label: "User",
            end_key: "a@x.com",
            relation_type: "OWNER",
            reverse_type: "OWNER_OF",
        }
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("label", "Table").is_ok());
        assert!(validate_identifier("label", "_Dashboard2").is_ok());
        assert!(validate_identifier("label", "Table) DETACH DELETE (n").is_err());
        assert!(validate_identifier("label", "2fast").is_err());
        assert!(validate_identifier("label", "").is_err());
    }

    #[test]
    fn test_constraint_syntax_by_version() {
        let modern = create_constraint("Table", Some(&Version::new(5, 0, 0))).unwrap();
        assert!(modern.statement.contains("IF NOT EXISTS FOR (node:Table) REQUIRE"));

        let unknown = create_constraint("Table", None).unwrap();
        assert_eq!(unknown, modern);

        let legacy = create_constraint("Table", Some(&Version::new(4, 3, 0))).unwrap();
        assert_eq!(
            legacy.statement,
            "CREATE CONSTRAINT ON (node:Table) ASSERT node.key IS UNIQUE"
        );
    }

    #[test]
    fn test_merge_node() {
        let mut props = Map::new();
        props.insert("name".to_string(), json!("orders"));
        let statement = merge_node("Table", "k", props.clone(), "2024-01-01", false).unwrap();
        assert!(statement.statement.starts_with("MERGE (node:Table {key: $key})"));
        assert!(statement.statement.contains("ON MATCH SET node += $props"));
        assert!(statement.statement.contains("node.publisher_last_updated_epoch_ms = timestamp()"));
        assert_eq!(statement.parameters["key"], "k");
        assert_eq!(statement.parameters["props"], json!({"name": "orders"}));
        assert_eq!(statement.parameters["publish_tag"], "2024-01-01");

        let create_only = merge_node("User", "k", props, "2024-01-01", true).unwrap();
        assert!(create_only.statement.contains("ON CREATE SET"));
        assert!(!create_only.statement.contains("ON MATCH"));
    }

    #[test]
    fn test_merge_relation() {
        let statement = merge_relation(&ends(), Map::new(), "tag").unwrap();
        assert!(statement.statement.contains("MATCH (n1:Table {key: $start_key}), (n2:User {key: $end_key})"));
        assert!(statement.statement.contains("MERGE (n1)-[r1:OWNER]->(n2)-[r2:OWNER_OF]->(n1)"));
        assert!(statement.statement.contains("r2.published_tag = $publish_tag"));
        assert_eq!(statement.parameters["end_key"], "a@x.com");

        let mut bad = ends();
        bad.relation_type = "OWNER]->()";
        assert!(merge_relation(&bad, Map::new(), "tag").is_err());
    }

    #[test]
    fn test_delete_relations_from() {
        let statement = delete_relations_from(&ends()).unwrap();
        assert!(statement.statement.contains("-[r1:OWNER]->(n2:User)"));
        assert!(statement.statement.contains("OPTIONAL MATCH (n2)-[r2:OWNER_OF]->(n1)"));
        assert_eq!(statement.parameters.len(), 1);
    }

    #[test]
    fn test_staleness_statements() {
        let tag = StalenessMarker::PublishTag("2024-01-02".to_string());
        let statement = count_stale(Target::Node("Table"), &tag).unwrap();
        assert_eq!(
            statement.statement,
            "MATCH (target:Table) WHERE (target.published_tag < $marker OR target.published_tag IS NULL) RETURN count(*) AS count"
        );
        assert_eq!(statement.parameters["marker"], "2024-01-02");

        let expire = StalenessMarker::ExpireMs(86_400_000);
        let statement = delete_stale(Target::Relation("COLUMN"), &expire, 100).unwrap();
        assert!(statement.statement.starts_with("MATCH ()-[target:COLUMN]->()"));
        assert!(statement.statement.contains("timestamp() - $marker"));
        assert!(statement.statement.contains("\nDELETE target"));
        assert_eq!(statement.parameters["batch_size"], 100);

        let statement = delete_stale(Target::Node("Table"), &tag, 10).unwrap();
        assert!(statement.statement.contains("DETACH DELETE target"));

        assert!(count_total(Target::Node("Bad Label")).is_err());
    }
}
