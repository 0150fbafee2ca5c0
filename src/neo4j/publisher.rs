//! Publishing staged CSV files into Neo4j

use super::cypher::{self, RelationEnds};
use crate::client::{CypherRunner, Neo4jClient, Statement};
use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Publisher;
use crate::models::{
    NODE_KEY, NODE_LABEL, RELATION_END_KEY, RELATION_END_LABEL, RELATION_REVERSE_TYPE,
    RELATION_START_KEY, RELATION_START_LABEL, RELATION_TYPE,
};
use crate::storage::Neo4jCsvReader;
use eyre::{Context, Result, eyre};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_TRANSACTION_SIZE: u64 = 500;
pub const DEFAULT_PROGRESS_REPORT_FREQUENCY: u64 = 500;

const RELATION_FIELDS: [&str; 6] = [
    RELATION_START_LABEL,
    RELATION_END_LABEL,
    RELATION_START_KEY,
    RELATION_END_KEY,
    RELATION_TYPE,
    RELATION_REVERSE_TYPE,
];

/// Statements to run ahead of each relationship
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RelationPreprocessor {
    #[default]
    Noop,
    /// Replace a start node's relationships of a type with the published ones
    ///
    /// Existing edges are removed the first time a (start node, type) pair
    /// is seen in a publish.
    DeleteExisting { seen: HashSet<(String, String, String)> },
}

impl RelationPreprocessor {
    pub fn delete_existing() -> Self {
        Self::DeleteExisting {
            seen: HashSet::new(),
        }
    }

    fn statements(&mut self, ends: &RelationEnds<'_>) -> Result<Vec<Statement>> {
        match self {
            Self::Noop => Ok(Vec::new()),
            Self::DeleteExisting { seen } => {
                let first = seen.insert((
                    ends.start_label.to_string(),
                    ends.start_key.to_string(),
                    ends.relation_type.to_string(),
                ));
                if first {
                    Ok(vec![cypher::delete_relations_from(ends)?])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }
}

impl std::str::FromStr for RelationPreprocessor {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "noop" => Ok(Self::Noop),
            "delete" | "delete_existing" => Ok(Self::delete_existing()),
            other => eyre::bail!(
                "Unknown relation preprocessor '{}', expected 'noop' or 'delete'",
                other
            ),
        }
    }
}

/// Accumulates statements and commits them `size` at a time
struct TransactionBatch<'a> {
    client: &'a dyn CypherRunner,
    size: usize,
    statements: Vec<Statement>,
    expects_row: Vec<bool>,
    committed: usize,
    unmatched: usize,
}

impl<'a> TransactionBatch<'a> {
    fn new(client: &'a dyn CypherRunner, size: usize) -> Self {
        Self {
            client,
            size: size.max(1),
            statements: Vec::new(),
            expects_row: Vec::new(),
            committed: 0,
            unmatched: 0,
        }
    }

    async fn push(&mut self, statement: Statement, expects_row: bool) -> Result<()> {
        self.statements.push(statement);
        self.expects_row.push(expects_row);
        if self.statements.len() >= self.size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.statements.is_empty() {
            return Ok(());
        }
        let statements = std::mem::take(&mut self.statements);
        let expects_row = std::mem::take(&mut self.expects_row);

        let results = self.client.commit(&statements).await.with_context(|| {
            format!(
                "Failed to commit transaction of {} statement(s) after {} committed",
                statements.len(),
                self.committed
            )
        })?;
        self.unmatched += results
            .iter()
            .zip(expects_row)
            .filter(|(result, expects)| *expects && result.is_empty())
            .count();
        self.committed += statements.len();
        Ok(())
    }
}

/// Publishes node and relationship CSV files into Neo4j
///
/// 1. A unique constraint on `key` is ensured for every node label staged.
/// 2. Node files are merged, then relationship files, each in file-name order.
/// 3. Everything written is stamped with the job's publish tag and the
///    server time, which staleness removal later relies on.
pub struct Neo4jCsvPublisher {
    client: Arc<dyn CypherRunner>,
    node_dir: PathBuf,
    relation_dir: PathBuf,
    publish_tag: String,
    transaction_size: usize,
    progress_report_frequency: u64,
    create_only_labels: HashSet<String>,
    preprocessor: RelationPreprocessor,
}

impl Neo4jCsvPublisher {
    /// # Errors
    /// Returns an error if `publish_tag` is empty
    pub fn new(
        client: impl CypherRunner + 'static,
        node_dir: impl AsRef<Path>,
        relation_dir: impl AsRef<Path>,
        publish_tag: impl Into<String>,
    ) -> Result<Self> {
        let publish_tag = publish_tag.into();
        if publish_tag.trim().is_empty() {
            eyre::bail!("job_publish_tag must not be empty");
        }
        Ok(Self {
            client: Arc::new(client),
            node_dir: node_dir.as_ref().to_path_buf(),
            relation_dir: relation_dir.as_ref().to_path_buf(),
            publish_tag,
            transaction_size: DEFAULT_TRANSACTION_SIZE as usize,
            progress_report_frequency: DEFAULT_PROGRESS_REPORT_FREQUENCY,
            create_only_labels: HashSet::new(),
            preprocessor: RelationPreprocessor::Noop,
        })
    }

    pub fn with_transaction_size(mut self, size: usize) -> Self {
        self.transaction_size = size.max(1);
        self
    }

    pub fn with_progress_report_frequency(mut self, frequency: u64) -> Self {
        self.progress_report_frequency = frequency.max(1);
        self
    }

    pub fn with_create_only_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_only_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation_preprocessor(mut self, preprocessor: RelationPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn publish_tag(&self) -> &str {
        &self.publish_tag
    }

    /// Every file in both staging directories, nodes first
    pub fn staged_files(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        Ok((
            Neo4jCsvReader::list_files(&self.node_dir)?,
            Neo4jCsvReader::list_files(&self.relation_dir)?,
        ))
    }

    async fn create_constraints(&self, client: &dyn CypherRunner, labels: &BTreeSet<String>) -> Result<()> {
        for label in labels {
            let statement = cypher::create_constraint(label, client.version())?;
            match client.run(statement).await {
                Ok(_) => log::debug!("Ensured unique key constraint on {}", label),
                Err(err) if cypher::is_existing_constraint_error(&format!("{:#}", err)) => {
                    log::debug!("Constraint on {} already exists", label)
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to create constraint on {}", label));
                }
            }
        }
        Ok(())
    }

    fn node_statement(&self, mut row: Map<String, Value>) -> Result<Statement> {
        let key = take_string(&mut row, NODE_KEY)?;
        let label = take_string(&mut row, NODE_LABEL)?;
        let create_only = self.create_only_labels.contains(&label);
        cypher::merge_node(&label, &key, row, &self.publish_tag, create_only)
    }

    fn report_progress(&self, count: u64, kind: &str, started: Instant) {
        if count % self.progress_report_frequency == 0 {
            log::info!(
                "Published {} {} in {:.1}s",
                count,
                kind,
                started.elapsed().as_secs_f64()
            );
        }
    }
}

fn take_string(row: &mut Map<String, Value>, field: &str) -> Result<String> {
    match row.remove(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(other) => Err(eyre!("Column {} must be a non-empty string, got: {}", field, other)),
        None => Err(eyre!("Missing column {}", field)),
    }
}

fn take_relation_fields(row: &mut Map<String, Value>) -> Result<[String; 6]> {
    let mut fields: [String; 6] = Default::default();
    for (slot, name) in fields.iter_mut().zip(RELATION_FIELDS) {
        *slot = take_string(row, name)?;
    }
    Ok(fields)
}

fn str_field<'a>(row: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    row.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| eyre!("Missing column {}", field))
}

impl Scoped for Neo4jCsvPublisher {
    const SCOPE: &'static str = "publisher.neo4j";
}

impl FromConfig for Neo4jCsvPublisher {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        let client = Neo4jClient::from_config(conf)?;
        let publish_tag = conf
            .get_opt_str("job_publish_tag")
            .ok_or_else(|| eyre!("Missing required config key 'job_publish_tag'"))?;
        let preprocessor: RelationPreprocessor = conf
            .get_string_or("neo4j_relation_preprocessor", "noop")
            .parse()?;

        Ok(Self::new(
            client,
            conf.get_str("node_files_directory")?,
            conf.get_str("relation_files_directory")?,
            publish_tag,
        )?
        .with_transaction_size(conf.get_u64_or("neo4j_transaction_size", DEFAULT_TRANSACTION_SIZE)? as usize)
        .with_progress_report_frequency(conf.get_u64_or(
            "neo4j_progress_report_frequency",
            DEFAULT_PROGRESS_REPORT_FREQUENCY,
        )?)
        .with_create_only_labels(conf.get_str_list("neo4j_create_only_nodes")?)
        .with_relation_preprocessor(preprocessor))
    }
}

impl Publisher for Neo4jCsvPublisher {
    async fn publish(&mut self) -> Result<()> {
        let started = Instant::now();
        let (node_files, relation_files) = self.staged_files()?;
        if node_files.is_empty() && relation_files.is_empty() {
            log::warn!(
                "Nothing to publish in {} or {}",
                self.node_dir.display(),
                self.relation_dir.display()
            );
            return Ok(());
        }

        let client = self.client.connect().await?;
        log::info!(
            "Publishing {} node file(s) and {} relationship file(s) to {} with tag {}",
            node_files.len(),
            relation_files.len(),
            client,
            self.publish_tag
        );

        let mut node_rows = Vec::with_capacity(node_files.len());
        let mut labels = BTreeSet::new();
        for file in &node_files {
            let rows = Neo4jCsvReader::read(file)?;
            for row in &rows {
                labels.insert(str_field(row, NODE_LABEL)?.to_string());
            }
            node_rows.push((file, rows));
        }
        self.create_constraints(client.as_ref(), &labels).await?;

        let mut batch = TransactionBatch::new(client.as_ref(), self.transaction_size);
        let mut nodes = 0u64;
        for (file, rows) in node_rows {
            log::debug!("Publishing nodes from {}", file.display());
            for row in rows {
                let statement = self
                    .node_statement(row)
                    .with_context(|| format!("Invalid node row in {}", file.display()))?;
                batch.push(statement, false).await?;
                nodes += 1;
                self.report_progress(nodes, "nodes", started);
            }
        }
        batch.flush().await?;

        if let RelationPreprocessor::DeleteExisting { seen } = &mut self.preprocessor {
            seen.clear();
        }
        let mut relations = 0u64;
        for file in &relation_files {
            log::debug!("Publishing relationships from {}", file.display());
            for mut row in Neo4jCsvReader::read(file)? {
                let [start_label, end_label, start_key, end_key, relation_type, reverse_type] =
                    take_relation_fields(&mut row)
                        .with_context(|| format!("Invalid relationship row in {}", file.display()))?;
                let ends = RelationEnds {
                    start_label: &start_label,
                    start_key: &start_key,
                    end_label: &end_label,
                    end_key: &end_key,
                    relation_type: &relation_type,
                    reverse_type: &reverse_type,
                };
                let preprocess = self.preprocessor.statements(&ends)?;
                let statement = cypher::merge_relation(&ends, row, &self.publish_tag)
                    .with_context(|| format!("Invalid relationship row in {}", file.display()))?;

                for statement in preprocess {
                    batch.push(statement, false).await?;
                }
                batch.push(statement, true).await?;
                relations += 1;
                self.report_progress(relations, "relationships", started);
            }
        }
        batch.flush().await?;

        if batch.unmatched > 0 {
            log::warn!(
                "{} relationship(s) skipped because an endpoint node does not exist",
                batch.unmatched
            );
        }
        log::info!(
            "Published {} node(s) and {} relationship(s) in {} statement(s) ({:.1}s)",
            nodes,
            relations,
            batch.committed,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
