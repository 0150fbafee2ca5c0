//! Publishing staged search documents into a fresh Elasticsearch index

use crate::client::{Auth, ElasticsearchClient, SearchBackend};
use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Publisher;
use crate::storage::NdjsonReader;
use eyre::{Context, Result, eyre};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_BULK_SIZE: u64 = 500;

/// Index settings and mappings for table search documents
pub fn default_table_mapping() -> Value {
    json!({
        "settings": {
            "analysis": {
                "normalizer": {
                    "lowercase_normalizer": {"type": "custom", "filter": ["lowercase"]}
                }
            }
        },
        "mappings": {
            "properties": {
                "key": {"type": "keyword"},
                "name": {
                    "type": "text",
                    "analyzer": "simple",
                    "fields": {"raw": {"type": "keyword", "normalizer": "lowercase_normalizer"}}
                },
                "database": {"type": "keyword"},
                "cluster": {"type": "keyword"},
                "schema": {
                    "type": "text",
                    "analyzer": "simple",
                    "fields": {"raw": {"type": "keyword", "normalizer": "lowercase_normalizer"}}
                },
                "description": {"type": "text", "analyzer": "simple"},
                "column_names": {
                    "type": "text",
                    "analyzer": "simple",
                    "fields": {"raw": {"type": "keyword", "normalizer": "lowercase_normalizer"}}
                },
                "column_descriptions": {"type": "text", "analyzer": "simple"},
                "tags": {"type": "keyword"},
                "last_updated_timestamp": {"type": "date", "format": "epoch_second"}
            }
        }
    })
}

/// Builds an NDJSON `_bulk` body indexing `documents` into `index`
fn bulk_body(index: &str, documents: &[Value]) -> Result<String> {
    let action = serde_json::to_string(&json!({"index": {"_index": index}}))?;
    let mut body = String::new();
    for document in documents {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Publishes an NDJSON file into a new index and moves an alias onto it
///
/// Readers of the alias switch from the old indices to the new one in a
/// single alias update, after which the old indices are deleted. An empty
/// file leaves the alias untouched. If indexing or the alias update fails,
/// the new index is deleted again.
pub struct ElasticsearchPublisher {
    client: Box<dyn SearchBackend>,
    file_path: PathBuf,
    alias: String,
    new_index: String,
    mapping: Value,
    bulk_size: usize,
}

impl ElasticsearchPublisher {
    pub fn new(
        client: impl SearchBackend + 'static,
        file_path: impl AsRef<Path>,
        alias: impl Into<String>,
        new_index: impl Into<String>,
    ) -> Self {
        Self {
            client: Box::new(client),
            file_path: file_path.as_ref().to_path_buf(),
            alias: alias.into(),
            new_index: new_index.into(),
            mapping: default_table_mapping(),
            bulk_size: DEFAULT_BULK_SIZE as usize,
        }
    }

    pub fn with_mapping(mut self, mapping: Value) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = bulk_size.max(1);
        self
    }

    pub fn new_index(&self) -> &str {
        &self.new_index
    }
}

/// `{alias}_{publish_tag}_{epoch_ms}` (or `{alias}_{epoch_ms}`), lowercased
/// as index names must be
fn default_index_name(alias: &str, publish_tag: Option<&str>) -> String {
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    match publish_tag {
        Some(tag) => format!("{}_{}_{}", alias, tag, epoch_ms),
        None => format!("{}_{}", alias, epoch_ms),
    }
    .to_lowercase()
}

impl Scoped for ElasticsearchPublisher {
    const SCOPE: &'static str = "publisher.elasticsearch";
}

impl FromConfig for ElasticsearchPublisher {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        let endpoint = conf
            .get_opt_str("elasticsearch_endpoint")
            .map(String::from)
            .or_else(|| std::env::var("ELASTICSEARCH_ENDPOINT").ok())
            .ok_or_else(|| eyre!("Missing 'elasticsearch_endpoint' (or ELASTICSEARCH_ENDPOINT)"))?;
        let auth = Auth::from_parts(
            conf.get_opt_str("elasticsearch_user").map(String::from),
            conf.get_opt_str("elasticsearch_password").map(String::from),
            conf.get_opt_str("elasticsearch_api_key").map(String::from),
        );
        let client = ElasticsearchClient::try_new(&endpoint, auth)
            .context("Failed to create Elasticsearch client")?;

        let alias = conf.get_str("elasticsearch_alias")?;
        let new_index = match conf.get_opt_str("elasticsearch_new_index") {
            Some(index) if !index.is_empty() => index.to_string(),
            _ => default_index_name(alias, conf.get_opt_str("job_publish_tag").filter(|t| !t.is_empty())),
        };
        let mapping = match conf.get("elasticsearch_mapping") {
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).context("elasticsearch_mapping is not valid JSON")?
            }
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(other) => eyre::bail!("elasticsearch_mapping must be JSON, got: {}", other),
            None => default_table_mapping(),
        };

        Ok(Self::new(client, conf.get_str("file_path")?, alias, new_index)
            .with_mapping(mapping)
            .with_bulk_size(conf.get_u64_or("elasticsearch_bulk_size", DEFAULT_BULK_SIZE)? as usize))
    }
}

impl ElasticsearchPublisher {
    async fn index_documents(&self, documents: &[Value]) -> Result<()> {
        for (index, chunk) in documents.chunks(self.bulk_size).enumerate() {
            let response = self
                .client
                .bulk(bulk_body(&self.new_index, chunk)?)
                .await
                .with_context(|| format!("Bulk request #{} failed", index + 1))?;
            if response.errors {
                let failures = response.failures();
                eyre::bail!(
                    "Bulk request #{} had {} failed document(s), first: {}",
                    index + 1,
                    failures.len(),
                    failures.first().map(String::as_str).unwrap_or("unknown error")
                );
            }
            log::debug!("Indexed batch #{} ({} documents)", index + 1, chunk.len());
        }
        Ok(())
    }
}

impl Publisher for ElasticsearchPublisher {
    async fn publish(&mut self) -> Result<()> {
        let documents = NdjsonReader::new(&self.file_path).read()?;
        if documents.is_empty() {
            log::warn!(
                "No documents in {}, leaving alias {} untouched",
                self.file_path.display(),
                self.alias
            );
            return Ok(());
        }

        let old_indices = self.client.indices_for_alias(&self.alias).await?;
        if old_indices.contains(&self.new_index) {
            eyre::bail!(
                "Index {} is already behind alias {}, publish into a new index",
                self.new_index,
                self.alias
            );
        }
        log::info!(
            "Publishing {} document(s) to index {} on {}",
            documents.len(),
            self.new_index,
            self.client
        );
        self.client.create_index(&self.new_index, &self.mapping).await?;

        let indexed = match self.index_documents(&documents).await {
            Ok(()) => self
                .client
                .swap_alias(&self.alias, &self.new_index, &old_indices)
                .await,
            Err(err) => Err(err),
        };
        if let Err(err) = indexed {
            log::warn!("Deleting index {} after failed publish", self.new_index);
            if let Err(cleanup) = self.client.delete_index(&self.new_index).await {
                log::warn!("Failed to delete index {}: {:#}", self.new_index, cleanup);
            }
            return Err(err);
        }
        log::info!("Alias {} now points at {}", self.alias, self.new_index);

        for old in &old_indices {
            self.client
                .delete_index(old)
                .await
                .with_context(|| format!("Failed to delete old index {}", old))?;
            log::info!("Deleted old index {}", old);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BulkResponse;
    use async_trait::async_trait;
    use serial_test::serial;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Serves alias lookups from memory and logs every call
    #[derive(Default)]
    struct MemoryBackend {
        aliased: Vec<String>,
        failing_bulk: Option<usize>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MemoryBackend {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl std::fmt::Display for MemoryBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "memory")
        }
    }

    #[async_trait]
    impl SearchBackend for MemoryBackend {
        async fn create_index(&self, index: &str, _body: &Value) -> Result<()> {
            self.record(format!("create {}", index));
            Ok(())
        }

        async fn bulk(&self, body: String) -> Result<BulkResponse> {
            self.record(format!("bulk {}", body.lines().count() / 2));
            let round = self
                .calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with("bulk"))
                .count();
            let errors = self.failing_bulk == Some(round);
            let items = match errors {
                true => vec![json!({"index": {"status": 400, "error": {"reason": "mapper_parsing_exception"}}})],
                false => Vec::new(),
            };
            Ok(BulkResponse { errors, items })
        }

        async fn indices_for_alias(&self, alias: &str) -> Result<Vec<String>> {
            self.record(format!("alias {}", alias));
            Ok(self.aliased.clone())
        }

        async fn swap_alias(&self, alias: &str, new_index: &str, old_indices: &[String]) -> Result<()> {
            self.record(format!("swap {} -> {} from {:?}", alias, new_index, old_indices));
            Ok(())
        }

        async fn delete_index(&self, index: &str) -> Result<()> {
            self.record(format!("delete {}", index));
            Ok(())
        }
    }

    fn write_documents(temp: &TempDir, count: usize) -> PathBuf {
        let path = temp.path().join("docs.json");
        let lines: Vec<String> = (0..count)
            .map(|i| json!({"key": format!("hive://gold.core/t{}", i)}).to_string())
            .collect();
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_bulk_body() {
        let body = bulk_body("tables_1", &[json!({"name": "orders"}), json!({"name": "users"})]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"index":{"_index":"tables_1"}}"#);
        assert_eq!(lines[1], r#"{"name":"orders"}"#);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_default_index_name() {
        let name = default_index_name("table_search_index", Some("2024-01-01"));
        assert!(name.starts_with("table_search_index_2024-01-01_"));
        let epoch_ms = name.rsplit('_').next().unwrap();
        assert!(epoch_ms.parse::<u128>().unwrap() > 0);

        assert!(default_index_name("Tables", Some("RUN")).starts_with("tables_run_"));
        let untagged = default_index_name("tables", None);
        assert!(untagged.trim_start_matches("tables_").parse::<u128>().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_config() {
        let conf = ConfigTree::from_value(json!({
            "elasticsearch_endpoint": "http://localhost:9200",
            "elasticsearch_alias": "table_search_index",
            "file_path": "/tmp/docs.json",
            "job_publish_tag": "2024-01-01",
            "elasticsearch_mapping": "{\"mappings\": {\"properties\": {}}}"
        }))
        .unwrap();
        let publisher = ElasticsearchPublisher::from_config(&conf).unwrap();
        assert!(publisher.new_index().starts_with("table_search_index_2024-01-01_"));
        assert_eq!(publisher.mapping, json!({"mappings": {"properties": {}}}));
        assert_eq!(publisher.bulk_size, 500);

        let conf = ConfigTree::from_value(json!({
            "elasticsearch_alias": "a",
            "file_path": "/tmp/docs.json"
        }))
        .unwrap();
        unsafe {
            std::env::remove_var("ELASTICSEARCH_ENDPOINT");
        }
        assert!(ElasticsearchPublisher::from_config(&conf).is_err());
    }

    #[tokio::test]
    async fn test_empty_file_publishes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("docs.json");
        std::fs::write(&path, "\n").unwrap();

        let client = ElasticsearchClient::try_new("http://127.0.0.1:9", Auth::None).unwrap();
        let mut publisher = ElasticsearchPublisher::new(client, &path, "tables", "tables_1");
        publisher.publish().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let client = ElasticsearchClient::try_new("http://127.0.0.1:9", Auth::None).unwrap();
        let mut publisher =
            ElasticsearchPublisher::new(client, "/nonexistent/docs.json", "tables", "tables_1");
        assert!(publisher.publish().await.is_err());
    }

    #[tokio::test]
    async fn test_publish_swaps_alias_and_drops_old_indices() {
        let temp = TempDir::new().unwrap();
        let path = write_documents(&temp, 3);
        let backend = MemoryBackend {
            aliased: vec!["tables_1".to_string()],
            ..Default::default()
        };
        let calls = backend.calls.clone();

        let mut publisher = ElasticsearchPublisher::new(backend, &path, "tables", "tables_2").with_bulk_size(2);
        publisher.publish().await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "alias tables",
                "create tables_2",
                "bulk 2",
                "bulk 1",
                r#"swap tables -> tables_2 from ["tables_1"]"#,
                "delete tables_1",
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_item_error_aborts_and_removes_new_index() {
        let temp = TempDir::new().unwrap();
        let path = write_documents(&temp, 3);
        let backend = MemoryBackend {
            aliased: vec!["tables_1".to_string()],
            failing_bulk: Some(1),
            ..Default::default()
        };
        let calls = backend.calls.clone();

        let mut publisher = ElasticsearchPublisher::new(backend, &path, "tables", "tables_2").with_bulk_size(2);
        let err = publisher.publish().await.unwrap_err();

        assert!(err.to_string().contains("1 failed document(s)"));
        assert!(err.to_string().contains("mapper_parsing_exception"));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["alias tables", "create tables_2", "bulk 2", "delete tables_2"]
        );
    }

    #[tokio::test]
    async fn test_publish_into_live_index_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = write_documents(&temp, 1);
        let backend = MemoryBackend {
            aliased: vec!["tables_2024-01-01".to_string()],
            ..Default::default()
        };
        let calls = backend.calls.clone();

        let mut publisher = ElasticsearchPublisher::new(backend, &path, "tables", "tables_2024-01-01");
        let err = publisher.publish().await.unwrap_err();

        assert!(err.to_string().contains("already behind alias tables"));
        assert_eq!(*calls.lock().unwrap(), vec!["alias tables"]);
    }
}
