//! CLI helper functions
//!
//! A job config names its extractor, its dict transformers and its kind:
//!
//! ```yaml
//! job:
//!   identifier: hive_tables
//!   kind: graph                 # graph (Neo4j) or search (Elasticsearch)
//!   extractor: csvtablecolumn   # generic, csv, csvtablecolumn, neo4j, restapi
//!   transformers: [remove_field]
//!   cleanup_staging: true
//! ```
//!
//! Each component then reads its own scope (`extractor.csvtablecolumn`,
//! `transformer.remove_field`, `loader.filesystem_csv_neo4j`, ...).

use crate::{
    client::Neo4jClient,
    config::{self, ConfigTree},
    elasticsearch::ElasticsearchPublisher,
    etl::{
        Callbacks, ChainedTransformer, DefaultJob, DefaultTask, Extractor, GenericExtractor,
        JobReport, Publisher, Task, Transformer,
    },
    extractors::{CsvExtractor, CsvTableColumnExtractor},
    neo4j::{Neo4jCsvPublisher, Neo4jExtractor, Neo4jStalenessRemovalTask, StalenessReport},
    rest_api::RestApiExtractor,
    storage::{CleanupStagingCallback, FsElasticsearchJsonLoader, FsNeo4jCsvLoader},
    transform::{
        DictToModel, RegexStrReplaceTransformer, RemoveFieldTransformer,
        TemplateVariableSubstitutionTransformer,
    },
};
use config::Scoped;
use eyre::{Context, Result, eyre};
use semver::Version;
use serde_json::Value;
use std::path::Path;

/// Load a job config file and resolve environment references
pub fn load_job_config(path: impl AsRef<Path>) -> Result<ConfigTree> {
    let path = path.as_ref();
    let conf = ConfigTree::from_file(path)?;
    log::debug!("Loaded job config from {}", path.display());
    Ok(conf)
}

/// What a job publishes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Graph,
    Search,
}

impl JobKind {
    pub fn from_config(conf: &ConfigTree) -> Result<Self> {
        conf.get_string_or("job.kind", "graph").parse()
    }
}

impl std::str::FromStr for JobKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "graph" | "neo4j" => Ok(Self::Graph),
            "search" | "elasticsearch" => Ok(Self::Search),
            other => eyre::bail!("Unknown job kind '{}', expected 'graph' or 'search'", other),
        }
    }
}

/// Any configured source of dict records
pub enum DictExtractor {
    Generic(GenericExtractor<Value>),
    Csv(CsvExtractor),
    CsvTableColumn(CsvTableColumnExtractor),
    Neo4j(Neo4jExtractor),
    RestApi(RestApiExtractor),
}

impl DictExtractor {
    /// Build the extractor named by `job.extractor`
    pub fn from_config(conf: &ConfigTree) -> Result<Self> {
        let name = conf
            .get_opt_str("job.extractor")
            .ok_or_else(|| eyre!("Missing 'job.extractor'"))?;
        Ok(match name.trim().to_lowercase().as_str() {
            "generic" => Self::Generic(config::build(conf)?),
            "csv" => Self::Csv(config::build(conf)?),
            "csvtablecolumn" | "csv_table_column" => Self::CsvTableColumn(config::build(conf)?),
            "neo4j" => Self::Neo4j(config::build(conf)?),
            "restapi" | "rest_api" => Self::RestApi(config::build(conf)?),
            other => eyre::bail!(
                "Unknown extractor '{}', expected one of: generic, csv, csvtablecolumn, neo4j, restapi",
                other
            ),
        })
    }
}

impl Extractor for DictExtractor {
    type Item = Value;

    async fn extract(&mut self) -> Result<Option<Self::Item>> {
        match self {
            Self::Generic(e) => e.extract().await,
            Self::Csv(e) => e.extract().await,
            Self::CsvTableColumn(e) => e.extract().await,
            Self::Neo4j(e) => e.extract().await,
            Self::RestApi(e) => e.extract().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Generic(e) => e.close().await,
            Self::Csv(e) => e.close().await,
            Self::CsvTableColumn(e) => e.close().await,
            Self::Neo4j(e) => e.close().await,
            Self::RestApi(e) => e.close().await,
        }
    }
}

/// Chain the dict transformers listed in `job.transformers`, in order
pub fn build_transformers(conf: &ConfigTree) -> Result<ChainedTransformer<Value>> {
    let mut chain = ChainedTransformer::default();
    for name in conf.get_str_list("job.transformers")? {
        match name.as_str() {
            "remove_field" => chain.push(config::build::<RemoveFieldTransformer>(conf)?),
            "regex_str_replace" => chain.push(config::build::<RegexStrReplaceTransformer>(conf)?),
            "template_variable_substitution" => {
                chain.push(config::build::<TemplateVariableSubstitutionTransformer>(conf)?)
            }
            other => eyre::bail!(
                "Unknown transformer '{}', expected one of: remove_field, regex_str_replace, template_variable_substitution",
                other
            ),
        }
    }
    Ok(chain)
}

/// Copy `from` to `to` when `to` is not set
fn default_key(conf: &mut ConfigTree, to: &str, from: &str) {
    if !conf.contains(to) {
        if let Some(value) = conf.get(from).cloned() {
            conf.set(to, value);
        }
    }
}

/// Fill publisher settings that mirror the loader's staging paths
fn with_staging_defaults(conf: &ConfigTree) -> ConfigTree {
    let mut conf = conf.clone();
    let loader = FsNeo4jCsvLoader::SCOPE;
    let publisher = Neo4jCsvPublisher::SCOPE;
    default_key(
        &mut conf,
        &format!("{publisher}.node_files_directory"),
        &format!("{loader}.node_dir_path"),
    );
    default_key(
        &mut conf,
        &format!("{publisher}.relation_files_directory"),
        &format!("{loader}.relationship_dir_path"),
    );
    default_key(
        &mut conf,
        &format!("{}.file_path", ElasticsearchPublisher::SCOPE),
        &format!("{}.file_path", FsElasticsearchJsonLoader::SCOPE),
    );
    conf
}

fn cleanup_paths(conf: &ConfigTree, kind: JobKind) -> Vec<String> {
    let keys = match kind {
        JobKind::Graph => vec![
            format!("{}.node_files_directory", Neo4jCsvPublisher::SCOPE),
            format!("{}.relation_files_directory", Neo4jCsvPublisher::SCOPE),
        ],
        JobKind::Search => vec![format!("{}.file_path", ElasticsearchPublisher::SCOPE)],
    };
    keys.iter()
        .filter_map(|key| conf.get_opt_str(key).map(String::from))
        .collect()
}

/// Wrap a publisher with staging cleanup when `job.cleanup_staging` is set
fn with_callbacks<P: Publisher>(conf: &ConfigTree, kind: JobKind, publisher: P) -> Result<Callbacks<P>> {
    let callbacks = Callbacks::new(publisher);
    if conf.get_bool_or("job.cleanup_staging", false)? {
        return Ok(callbacks.register(CleanupStagingCallback::new(cleanup_paths(conf, kind))));
    }
    Ok(callbacks)
}

async fn launch<T, P>(conf: &ConfigTree, task: T, publisher: P) -> Result<JobReport>
where
    T: Task,
    P: Publisher,
{
    DefaultJob::from_config(conf, task, publisher).launch().await
}

/// Build and launch the job described by `conf`
///
/// Graph jobs: extractor → dict transformers → `DictToModel` →
/// `FsNeo4jCsvLoader`, published by `Neo4jCsvPublisher`.
/// Search jobs: extractor → dict transformers → `FsElasticsearchJsonLoader`,
/// published by `ElasticsearchPublisher`.
pub async fn run_job(conf: &ConfigTree) -> Result<JobReport> {
    let conf = with_staging_defaults(conf);
    let kind = JobKind::from_config(&conf)?;
    let extractor = DictExtractor::from_config(&conf)?;
    let transformers = build_transformers(&conf)?;
    log::info!("Building {:?} job with {} dict transformer(s)", kind, transformers.len());

    match kind {
        JobKind::Graph => {
            let transformer = transformers.then(config::build::<DictToModel>(&conf)?);
            let loader: FsNeo4jCsvLoader = config::build(&conf)?;
            let task = DefaultTask::new(extractor, transformer, loader).with_config(&conf)?;
            let publisher = with_callbacks(&conf, kind, config::build::<Neo4jCsvPublisher>(&conf)?)?;
            launch(&conf, task, publisher).await
        }
        JobKind::Search => {
            let loader: FsElasticsearchJsonLoader = config::build(&conf)?;
            let task = DefaultTask::new(extractor, transformers, loader).with_config(&conf)?;
            let publisher =
                with_callbacks(&conf, kind, config::build::<ElasticsearchPublisher>(&conf)?)?;
            launch(&conf, task, publisher).await
        }
    }
}

/// Run only the publisher over files staged by an earlier run
pub async fn publish_staged(conf: &ConfigTree) -> Result<()> {
    let conf = with_staging_defaults(conf);
    let kind = JobKind::from_config(&conf)?;
    match kind {
        JobKind::Graph => {
            let publisher = config::build::<Neo4jCsvPublisher>(&conf)?;
            with_callbacks(&conf, kind, publisher)?.publish().await
        }
        JobKind::Search => {
            let publisher = config::build::<ElasticsearchPublisher>(&conf)?;
            with_callbacks(&conf, kind, publisher)?.publish().await
        }
    }
}

/// Run staleness removal; `force_dry_run` overrides the config
pub async fn remove_stale(conf: &ConfigTree, force_dry_run: bool) -> Result<StalenessReport> {
    let mut task: Neo4jStalenessRemovalTask = config::build(conf)?;
    if force_dry_run {
        task = task.with_dry_run(true);
    }
    task.run().await
}

/// Neo4j connection settings, from the first scope that has an endpoint
pub fn neo4j_client(conf: &ConfigTree) -> Result<Neo4jClient> {
    let scopes = [
        Neo4jCsvPublisher::SCOPE,
        Neo4jStalenessRemovalTask::SCOPE,
        Neo4jExtractor::SCOPE,
    ];
    let scoped = scopes
        .iter()
        .map(|scope| conf.scoped(scope))
        .find(|scoped| scoped.contains("neo4j_endpoint"))
        .unwrap_or_default();
    Neo4jClient::from_config(&scoped)
}

/// Connect to Neo4j and return the version it reports
pub async fn ping(conf: &ConfigTree) -> Result<Option<Version>> {
    let client = neo4j_client(conf)?
        .connect()
        .await
        .context("Neo4j is not reachable")?;
    client
        .run(crate::client::Statement::new("RETURN 1 AS ok"))
        .await
        .context("Neo4j accepted the connection but failed a test query")?;
    Ok(client.version().cloned())
}
