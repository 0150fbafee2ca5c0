//! Serde description of a REST API query chain

use super::{HttpRestApiQuery, JsonSource, Pagination, Record, RestApiQuery, RestApiQuerySeed};
use eyre::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

fn default_page_param() -> String {
    "page".to_string()
}

fn default_start_page() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaginationConfig {
    pub max_record_size: usize,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_start_page")]
    pub start_page: u64,
}

impl From<PaginationConfig> for Pagination {
    fn from(config: PaginationConfig) -> Self {
        Self {
            max_record_size: config.max_record_size,
            page_param: config.page_param,
            start_page: config.start_page,
        }
    }
}

/// One HTTP step of a chain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RestApiQueryConfig {
    pub url: String,
    pub json_path: String,
    pub field_names: Vec<String>,
    #[serde(default)]
    pub fail_no_result: bool,
    #[serde(default)]
    pub skip_no_result: bool,
    #[serde(default)]
    pub can_skip_failure: bool,
    #[serde(default)]
    pub json_path_contains_or: bool,
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,
}

/// Seed records plus the ordered query steps joined on top of them
///
/// ```yaml
/// seed:
///   - org: acme
/// queries:
///   - url: https://api.example.com/orgs/{org}/spaces
///     json_path: spaces[*].[id,name]
///     field_names: [space_id, space_name]
///   - url: https://api.example.com/spaces/{space_id}/tables
///     json_path: tables[*].name
///     field_names: [table]
///     skip_no_result: true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RestApiChainConfig {
    #[serde(default)]
    pub seed: Vec<Record>,
    #[serde(default)]
    pub queries: Vec<RestApiQueryConfig>,
}

impl RestApiChainConfig {
    /// Build the chain, innermost first
    ///
    /// An empty seed list seeds the chain with a single empty record.
    pub fn build(self, source: Arc<dyn JsonSource>) -> Result<Box<dyn RestApiQuery>> {
        let seed = if self.seed.is_empty() {
            vec![Record::new()]
        } else {
            self.seed
        };

        let mut query: Box<dyn RestApiQuery> = Box::new(RestApiQuerySeed::new(seed));
        for (index, step) in self.queries.into_iter().enumerate() {
            let mut http = HttpRestApiQuery::new(
                query,
                source.clone(),
                step.url,
                &step.json_path,
                step.field_names,
            )
            .and_then(|q| q.with_json_path_contains_or(step.json_path_contains_or))
            .with_context(|| format!("Invalid REST API query #{}", index + 1))?
            .with_fail_no_result(step.fail_no_result)
            .with_skip_no_result(step.skip_no_result)
            .with_can_skip_failure(step.can_skip_failure);
            if let Some(pagination) = step.pagination {
                http = http.with_pagination(pagination.into());
            }
            query = Box::new(http);
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest_api::testing::StaticJsonSource;
    use serde_json::json;

    #[test]
    fn test_deserialize_defaults() {
        let config: RestApiChainConfig = serde_yaml::from_str(
            r#"
queries:
  - url: http://api/items
    json_path: items[*]
    field_names: [item]
    pagination:
      max_record_size: 50
"#,
        )
        .unwrap();
        let step = &config.queries[0];
        assert!(!step.fail_no_result);
        assert!(!step.skip_no_result);
        assert_eq!(
            step.pagination,
            Some(PaginationConfig {
                max_record_size: 50,
                page_param: "page".to_string(),
                start_page: 1
            })
        );
        assert!(config.seed.is_empty());
    }

    #[tokio::test]
    async fn test_build_empty_seed() {
        let source = Arc::new(StaticJsonSource::default().with("http://api/items", json!({"items": ["a"]})));
        let config = RestApiChainConfig {
            seed: Vec::new(),
            queries: vec![RestApiQueryConfig {
                url: "http://api/items".to_string(),
                json_path: "items[*]".to_string(),
                field_names: vec!["item".to_string()],
                fail_no_result: false,
                skip_no_result: false,
                can_skip_failure: false,
                json_path_contains_or: false,
                pagination: None,
            }],
        };
        let mut query = config.build(source).unwrap();
        let record = query.next_record().await.unwrap().unwrap();
        assert_eq!(record["item"], "a");
        assert!(query.next_record().await.unwrap().is_none());
    }

    #[test]
    fn test_build_rejects_empty_field_names() {
        let config: RestApiChainConfig = serde_json::from_value(json!({
            "queries": [{"url": "http://api", "json_path": "x", "field_names": []}]
        }))
        .unwrap();
        let source = Arc::new(StaticJsonSource::default());
        let err = config.build(source).err().unwrap();
        assert!(err.to_string().contains("query #1"));
    }
}
