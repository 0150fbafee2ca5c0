//! Elasticsearch client for index and alias management

use super::{Auth, base_url, build_client, ensure_success};
use async_trait::async_trait;
use eyre::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use url::Url;

/// Summary of a `_bulk` response
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl BulkResponse {
    /// Error reasons for every failed item
    pub fn failures(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| item.as_object()?.values().next()?.get("error"))
            .map(|error| match error.get("reason").and_then(|r| r.as_str()) {
                Some(reason) => reason.to_string(),
                None => error.to_string(),
            })
            .collect()
    }
}

/// Elasticsearch HTTP client
#[derive(Clone, Debug)]
pub struct ElasticsearchClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl ElasticsearchClient {
    pub fn try_new(endpoint: &str, auth: Auth) -> Result<Self> {
        Ok(Self {
            client: build_client(&auth, &BTreeMap::new(), None)?,
            endpoint: base_url(endpoint)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl std::fmt::Display for ElasticsearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint)
    }
}

/// Index and alias operations a search publish needs
#[async_trait]
pub trait SearchBackend: Send + Sync + std::fmt::Display {
    /// Create an index with the given settings and mappings body
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;

    /// Send an NDJSON `_bulk` body
    async fn bulk(&self, body: String) -> Result<BulkResponse>;

    /// Indices currently behind an alias (empty when the alias does not exist)
    async fn indices_for_alias(&self, alias: &str) -> Result<Vec<String>>;

    /// Atomically point `alias` at `new_index`, detaching it from `old_indices`
    async fn swap_alias(&self, alias: &str, new_index: &str, old_indices: &[String]) -> Result<()>;

    async fn delete_index(&self, index: &str) -> Result<()>;
}

#[async_trait]
impl SearchBackend for ElasticsearchClient {
    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        log::debug!("Creating index {}", index);
        let response = self
            .client
            .put(self.endpoint.join(index)?)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send create request for index {}", index))?;
        ensure_success(response, &format!("create index {}", index)).await?;
        Ok(())
    }

    async fn bulk(&self, body: String) -> Result<BulkResponse> {
        let response = self
            .client
            .post(self.endpoint.join("_bulk")?)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("Failed to send bulk request")?;
        let response = ensure_success(response, "bulk index documents").await?;
        response
            .json()
            .await
            .context("Failed to decode bulk response")
    }

    async fn indices_for_alias(&self, alias: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint.join(&format!("_alias/{}", alias))?)
            .send()
            .await
            .with_context(|| format!("Failed to look up alias {}", alias))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = ensure_success(response, &format!("look up alias {}", alias)).await?;
        let body: BTreeMap<String, Value> = response
            .json()
            .await
            .context("Failed to decode alias response")?;
        Ok(body.into_keys().collect())
    }

    async fn swap_alias(&self, alias: &str, new_index: &str, old_indices: &[String]) -> Result<()> {
        let actions = swap_alias_actions(alias, new_index, old_indices);
        let response = self
            .client
            .post(self.endpoint.join("_aliases")?)
            .json(&json!({ "actions": actions }))
            .send()
            .await
            .with_context(|| format!("Failed to send alias update for {}", alias))?;
        ensure_success(response, &format!("update alias {}", alias)).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        log::debug!("Deleting index {}", index);
        let response = self
            .client
            .delete(self.endpoint.join(index)?)
            .send()
            .await
            .with_context(|| format!("Failed to send delete request for index {}", index))?;
        ensure_success(response, &format!("delete index {}", index)).await?;
        Ok(())
    }
}

fn swap_alias_actions(alias: &str, new_index: &str, old_indices: &[String]) -> Vec<Value> {
    let mut actions: Vec<Value> = old_indices
        .iter()
        .filter(|index| index.as_str() != new_index)
        .map(|index| json!({"remove": {"index": index, "alias": alias}}))
        .collect();
    actions.push(json!({"add": {"index": new_index, "alias": alias}}));
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_alias_actions() {
        let actions = swap_alias_actions(
            "table_search_index",
            "table_search_index_2",
            &["table_search_index_1".to_string()],
        );
        assert_eq!(
            actions,
            vec![
                json!({"remove": {"index": "table_search_index_1", "alias": "table_search_index"}}),
                json!({"add": {"index": "table_search_index_2", "alias": "table_search_index"}}),
            ]
        );
    }

    #[test]
    fn test_bulk_failures() {
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 400, "error": {"type": "mapper_parsing_exception", "reason": "bad field"}}}
            ]
        }))
        .unwrap();
        assert_eq!(response.failures(), vec!["bad field".to_string()]);
    }
}
