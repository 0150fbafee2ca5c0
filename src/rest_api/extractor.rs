//! Extractor draining a REST API query chain

use super::{JsonSource, RestApiChainConfig, RestApiQuery};
use crate::client::{Auth, HttpClient};
use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Extractor;
use eyre::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Yields every record produced by the last step of a query chain
pub struct RestApiExtractor {
    query: Box<dyn RestApiQuery>,
}

impl RestApiExtractor {
    pub fn new(query: Box<dyn RestApiQuery>) -> Self {
        Self { query }
    }

    /// Build the chain from config, fetching through `source`
    pub fn from_config_with_source(conf: &ConfigTree, source: Arc<dyn JsonSource>) -> Result<Self> {
        let chain: RestApiChainConfig = serde_json::from_value(conf.as_value())
            .context("Invalid REST API query chain")?;
        if chain.queries.is_empty() {
            log::warn!("REST API extractor has no queries, only seed records will be extracted");
        }
        Ok(Self::new(chain.build(source)?))
    }
}

impl Scoped for RestApiExtractor {
    const SCOPE: &'static str = "extractor.restapi";
}

impl FromConfig for RestApiExtractor {
    /// Reads `seed`, `queries`, `headers`, `timeout_sec` and credentials
    /// (`api_key`, `bearer_token`, or `user` with `password`)
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        let headers: BTreeMap<String, String> = match conf.get("headers") {
            Some(value) => serde_json::from_value(value.clone())
                .context("'headers' must map header names to strings")?,
            None => BTreeMap::new(),
        };
        let auth = match conf.get_opt_str("bearer_token") {
            Some(token) if !token.is_empty() => Auth::Bearer(token.to_string()),
            _ => Auth::from_parts(
                conf.get_opt_str("user").map(String::from),
                conf.get_opt_str("password").map(String::from),
                conf.get_opt_str("api_key").map(String::from),
            ),
        };
        let timeout = match conf.get_u64_or("timeout_sec", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let client = HttpClient::try_new(auth, &headers, timeout)?;
        Self::from_config_with_source(conf, Arc::new(client))
    }
}

impl Extractor for RestApiExtractor {
    type Item = Value;

    async fn extract(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.query.next_record().await?.map(Value::Object))
    }
}
