//! Generic JSON-over-HTTP client used by REST API queries

use super::{Auth, build_client, ensure_success};
use crate::rest_api::JsonSource;
use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// HTTP client for fetching JSON documents from REST APIs
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client that sends `auth` and `headers` with every request
    pub fn try_new(
        auth: Auth,
        headers: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(&auth, headers, timeout)?,
        })
    }

    /// GET a URL and decode the body as JSON
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;
        let response = ensure_success(response, &format!("fetch {}", url)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to decode JSON from {}", url))
    }
}

#[async_trait]
impl JsonSource for HttpClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        HttpClient::get_json(self, url).await
    }
}
