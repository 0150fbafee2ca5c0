//! Extracting query results from Neo4j

use crate::client::{Neo4jClient, Statement};
use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Extractor;
use eyre::{Context, Result};
use serde_json::Value;
use std::collections::VecDeque;

/// Runs one read query and yields each row as a column → value object
///
/// The query runs on the first call to `extract`.
pub struct Neo4jExtractor {
    client: Neo4jClient,
    cypher_query: String,
    rows: Option<VecDeque<Value>>,
}

impl Neo4jExtractor {
    pub fn new(client: Neo4jClient, cypher_query: impl Into<String>) -> Self {
        Self {
            client,
            cypher_query: cypher_query.into(),
            rows: None,
        }
    }

    async fn fetch(&self) -> Result<VecDeque<Value>> {
        let client = self.client.clone().connect().await?;
        let result = client
            .run(Statement::new(self.cypher_query.as_str()))
            .await
            .with_context(|| format!("Failed to run extraction query against {}", client))?;
        log::info!("Neo4j query returned {} row(s)", result.len());
        Ok(result.records().into_iter().map(Value::Object).collect())
    }
}

impl Scoped for Neo4jExtractor {
    const SCOPE: &'static str = "extractor.neo4j";
}

impl FromConfig for Neo4jExtractor {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Ok(Self::new(
            Neo4jClient::from_config(conf)?,
            conf.get_str("cypher_query")?,
        ))
    }
}

impl Extractor for Neo4jExtractor {
    type Item = Value;

    async fn extract(&mut self) -> Result<Option<Self::Item>> {
        if self.rows.is_none() {
            self.rows = Some(self.fetch().await?);
        }
        Ok(self.rows.as_mut().and_then(VecDeque::pop_front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_query() {
        let conf = ConfigTree::from_pairs([("neo4j_endpoint", "http://localhost:7474")]);
        assert!(Neo4jExtractor::from_config(&conf).is_err());

        let conf = ConfigTree::from_pairs([
            ("neo4j_endpoint", "http://localhost:7474"),
            ("cypher_query", "MATCH (t:Table) RETURN t.key AS key"),
        ]);
        let extractor = Neo4jExtractor::from_config(&conf).unwrap();
        assert!(extractor.rows.is_none());
    }

    #[tokio::test]
    async fn test_extract_fails_when_unreachable() {
        let client =
            Neo4jClient::try_new("http://127.0.0.1:9", crate::client::Auth::None, "neo4j").unwrap();
        let mut extractor = Neo4jExtractor::new(client, "RETURN 1 AS one");
        assert!(extractor.extract().await.is_err());
    }
}
