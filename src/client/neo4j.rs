//! Neo4j client over the HTTP transactional Cypher API
//!
//! Every call to [`Neo4jClient::commit`] sends its statements to the
//! `tx/commit` endpoint, so they run and commit as a single transaction.
//! Any Cypher error rolls the whole batch back.

use super::{Auth, base_url, build_client, ensure_success};
use crate::config::ConfigTree;
use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

pub const DEFAULT_DATABASE: &str = "neo4j";

/// A parameterized Cypher statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub statement: String,
    pub parameters: Map<String, Value>,
}

impl Statement {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Columns and rows returned by one statement
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatementResult {
    pub columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RowData {
    row: Vec<Value>,
}

impl StatementResult {
    /// A result built from columns and rows
    pub fn from_rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            data: rows.into_iter().map(|row| RowData { row }).collect(),
        }
    }

    /// Rows as column → value objects
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.data
            .iter()
            .map(|data| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(data.row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Integer in `column` of the first row
    pub fn first_i64(&self, column: &str) -> Option<i64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.data.first()?.row.get(index)?.as_i64()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    statements: &'a [Statement],
}

/// Neo4j HTTP client
///
/// # Example
/// ```no_run
/// use databuilder::client::{Auth, Neo4jClient, Statement};
///
/// # async fn example() -> eyre::Result<()> {
/// let client = Neo4jClient::try_new(
///     "http://localhost:7474",
///     Auth::Basic("neo4j".into(), "test".into()),
///     "neo4j",
/// )?
/// .connect()
/// .await?;
///
/// let result = client
///     .run(Statement::new("MATCH (n:Table) RETURN count(n) AS count"))
///     .await?;
/// println!("{:?}", result.first_i64("count"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Neo4jClient {
    client: reqwest::Client,
    endpoint: Url,
    database: String,
    version: Option<Version>,
}

impl Neo4jClient {
    /// Create a client for an `http(s)://` endpoint
    pub fn try_new(endpoint: &str, auth: Auth, database: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(&auth, &BTreeMap::new(), None)?,
            endpoint: base_url(endpoint)?,
            database: database.into(),
            version: None,
        })
    }

    /// Create a client from `neo4j_endpoint`, `neo4j_user`, `neo4j_password`
    /// and `neo4j_database`, falling back to the `NEO4J_ENDPOINT`,
    /// `NEO4J_USER` and `NEO4J_PASSWORD` environment variables.
    pub fn from_config(conf: &ConfigTree) -> Result<Self> {
        let endpoint = conf
            .get_opt_str("neo4j_endpoint")
            .map(String::from)
            .or_else(|| std::env::var("NEO4J_ENDPOINT").ok())
            .ok_or_else(|| eyre!("Missing 'neo4j_endpoint' (or NEO4J_ENDPOINT)"))?;
        let user = conf
            .get_opt_str("neo4j_user")
            .map(String::from)
            .or_else(|| std::env::var("NEO4J_USER").ok());
        let password = conf
            .get_opt_str("neo4j_password")
            .map(String::from)
            .or_else(|| std::env::var("NEO4J_PASSWORD").ok());
        let database = conf.get_string_or("neo4j_database", DEFAULT_DATABASE);

        Self::try_new(&endpoint, Auth::from_parts(user, password, None), database)
            .context("Failed to create Neo4j client")
    }

    /// Discover the server version so later calls use the right endpoint
    pub async fn connect(mut self) -> Result<Self> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", self.endpoint))?;
        let response = ensure_success(response, "query Neo4j discovery endpoint").await?;
        let discovery: Value = response
            .json()
            .await
            .context("Failed to decode Neo4j discovery response")?;

        self.version = discovery
            .get("neo4j_version")
            .and_then(|v| v.as_str())
            .and_then(parse_version);
        match &self.version {
            Some(version) => log::debug!("Connected to Neo4j {} at {}", version, self.endpoint),
            None => log::warn!(
                "Neo4j at {} did not report a version, assuming 4.x+",
                self.endpoint
            ),
        }
        Ok(self)
    }

    /// Server version reported at connect time
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn commit_path(&self) -> String {
        match &self.version {
            Some(version) if version.major < 4 => "db/data/transaction/commit".to_string(),
            _ => format!("db/{}/tx/commit", self.database),
        }
    }

    /// Run statements as one transaction and return their results in order
    ///
    /// # Errors
    /// Returns an error if the request fails or Neo4j reports any error,
    /// in which case nothing from this batch was committed
    pub async fn commit(&self, statements: &[Statement]) -> Result<Vec<StatementResult>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint.join(&self.commit_path())?;
        log::trace!("Committing {} statement(s) to {}", statements.len(), url);

        let response = self
            .client
            .post(url)
            .json(&CommitRequest { statements })
            .send()
            .await
            .context("Failed to send transaction to Neo4j")?;
        let response = ensure_success(response, "commit Neo4j transaction").await?;
        let body: CommitResponse = response
            .json()
            .await
            .context("Failed to decode Neo4j transaction response")?;

        if let Some(error) = body.errors.first() {
            eyre::bail!(
                "Neo4j transaction rolled back ({} errors): {}: {}",
                body.errors.len(),
                error.code,
                error.message
            );
        }
        Ok(body.results)
    }

    /// Run a single statement in its own transaction
    pub async fn run(&self, statement: Statement) -> Result<StatementResult> {
        self.commit(std::slice::from_ref(&statement))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("Neo4j returned no result for statement"))
    }
}

/// Something that runs Cypher statements, one transaction per `commit`
///
/// Publishers and the staleness task talk to Neo4j through this trait.
#[async_trait]
pub trait CypherRunner: Send + Sync + std::fmt::Display {
    /// A runner ready for statements, with the server version discovered
    async fn connect(&self) -> Result<Arc<dyn CypherRunner>>;

    fn version(&self) -> Option<&Version>;

    /// Run statements as one transaction and return their results in order
    async fn commit(&self, statements: &[Statement]) -> Result<Vec<StatementResult>>;

    /// Run a single statement in its own transaction
    async fn run(&self, statement: Statement) -> Result<StatementResult> {
        self.commit(std::slice::from_ref(&statement))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("Neo4j returned no result for statement"))
    }
}

#[async_trait]
impl CypherRunner for Neo4jClient {
    async fn connect(&self) -> Result<Arc<dyn CypherRunner>> {
        Ok(Arc::new(self.clone().connect().await?))
    }

    fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    async fn commit(&self, statements: &[Statement]) -> Result<Vec<StatementResult>> {
        Neo4jClient::commit(self, statements).await
    }
}

impl std::fmt::Display for Neo4jClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (database: {})", self.endpoint, self.database)
    }
}

/// Parse versions like `5.12.0`, `4.4` or `4.4.11-aura`
fn parse_version(raw: &str) -> Option<Version> {
    let numeric: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts: Vec<&str> = numeric.split('.').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return None;
    }
    parts.resize(3, "0");
    Version::parse(&parts[..3].join(".")).ok()
}
