//! HTTP clients for the stores and sources a job talks to
//!
//! All clients share one way of building a `reqwest::Client` with default
//! headers and credentials, and one way of turning non-2xx responses into
//! errors that carry the response body.

mod auth;
mod elasticsearch;
mod http;
mod neo4j;

pub use auth::Auth;
pub use elasticsearch::{BulkResponse, ElasticsearchClient, SearchBackend};
pub use http::HttpClient;
pub use neo4j::{CypherRunner, Neo4jClient, Statement, StatementResult};

use eyre::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Build a reqwest client with auth and extra default headers
pub(crate) fn build_client(
    auth: &Auth,
    extra_headers: &BTreeMap<String, String>,
    timeout: Option<Duration>,
) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json"),
    );
    auth.apply(&mut headers)?;
    for (name, value) in extra_headers {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {}", name))?,
            HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header {}", name))?,
        );
    }

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to build HTTP client")
}

/// Parse an HTTP(S) endpoint and make sure relative joins append to its path
pub(crate) fn base_url(endpoint: &str) -> Result<Url> {
    let mut url =
        Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL: {}", endpoint))?;
    if !matches!(url.scheme(), "http" | "https") {
        eyre::bail!(
            "Unsupported scheme '{}' in {}, expected http or https",
            url.scheme(),
            endpoint
        );
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Fail with the status and body when a response is not a success
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    action: &str,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    eyre::bail!("Failed to {} ({}): {}", action, status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_appends_slash() {
        let url = base_url("http://localhost:7474").unwrap();
        assert_eq!(url.join("db/neo4j/tx/commit").unwrap().as_str(), "http://localhost:7474/db/neo4j/tx/commit");

        let url = base_url("https://es.example.com/proxy").unwrap();
        assert_eq!(url.join("_bulk").unwrap().as_str(), "https://es.example.com/proxy/_bulk");
    }

    #[test]
    fn test_base_url_rejects_bolt() {
        let err = base_url("bolt://localhost:7687").unwrap_err();
        assert!(err.to_string().contains("Unsupported scheme"));
    }

    #[test]
    fn test_build_client_rejects_bad_header() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        assert!(build_client(&Auth::None, &headers, None).is_err());
    }
}
