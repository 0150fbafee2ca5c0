//! Removal of nodes and relationships a publish no longer refreshes

use super::cypher::{self, StalenessMarker, Target};
use crate::client::{CypherRunner, Neo4jClient};
use crate::config::{ConfigTree, FromConfig, Scoped};
use eyre::{Context, Result, eyre};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_STALENESS_MAX_PCT: u64 = 5;
pub const DEFAULT_BATCH_SIZE: u64 = 100;
/// Expiry windows shorter than a day are refused unless overridden
pub const DEFAULT_MIN_MS_TO_EXPIRE: u64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Node,
    Relation,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Relation => write!(f, "relationship"),
        }
    }
}

/// Counts for one label or relationship type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessStat {
    pub kind: TargetKind,
    pub name: String,
    pub total: u64,
    pub stale: u64,
    pub deleted: u64,
}

impl StalenessStat {
    pub fn stale_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.stale as f64 * 100.0 / self.total as f64
        }
    }
}

/// Outcome of a staleness removal run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalenessReport {
    pub stats: Vec<StalenessStat>,
    pub dry_run: bool,
}

impl StalenessReport {
    pub fn deleted(&self) -> u64 {
        self.stats.iter().map(|s| s.deleted).sum()
    }
}

/// Deletes entities whose publish stamp is older than the current run
///
/// Every target is counted first. If any target's stale share is above its
/// threshold the run fails before deleting anything.
pub struct Neo4jStalenessRemovalTask {
    client: Arc<dyn CypherRunner>,
    target_nodes: Vec<String>,
    target_relations: Vec<String>,
    marker: StalenessMarker,
    staleness_max_pct: u64,
    staleness_pct_max: BTreeMap<String, u64>,
    batch_size: u64,
    dry_run: bool,
}

impl Neo4jStalenessRemovalTask {
    pub fn new(client: impl CypherRunner + 'static, marker: StalenessMarker) -> Self {
        Self {
            client: Arc::new(client),
            target_nodes: Vec::new(),
            target_relations: Vec::new(),
            marker,
            staleness_max_pct: DEFAULT_STALENESS_MAX_PCT,
            staleness_pct_max: BTreeMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }

    pub fn with_targets(mut self, nodes: Vec<String>, relations: Vec<String>) -> Self {
        self.target_nodes = nodes;
        self.target_relations = relations;
        self
    }

    pub fn with_staleness_max_pct(mut self, pct: u64) -> Self {
        self.staleness_max_pct = pct;
        self
    }

    /// Per label or relationship type threshold overrides
    pub fn with_staleness_pct_max(mut self, overrides: BTreeMap<String, u64>) -> Self {
        self.staleness_pct_max = overrides;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn threshold(&self, name: &str) -> u64 {
        self.staleness_pct_max
            .get(name)
            .copied()
            .unwrap_or(self.staleness_max_pct)
    }

    fn targets(&self) -> impl Iterator<Item = (TargetKind, &str)> {
        self.target_nodes
            .iter()
            .map(|n| (TargetKind::Node, n.as_str()))
            .chain(
                self.target_relations
                    .iter()
                    .map(|r| (TargetKind::Relation, r.as_str())),
            )
    }

    /// Targets whose stale share exceeds the allowed percentage
    fn violations(&self, stats: &[StalenessStat]) -> Vec<String> {
        stats
            .iter()
            .filter(|stat| stat.total > 0 && stat.stale_pct() > self.threshold(&stat.name) as f64)
            .map(|stat| {
                format!(
                    "{} {}: {} of {} stale ({:.2}% > {}%)",
                    stat.kind,
                    stat.name,
                    stat.stale,
                    stat.total,
                    stat.stale_pct(),
                    self.threshold(&stat.name)
                )
            })
            .collect()
    }

    async fn count(&self, client: &dyn CypherRunner, target: Target<'_>, stale: bool) -> Result<u64> {
        let statement = if stale {
            cypher::count_stale(target, &self.marker)?
        } else {
            cypher::count_total(target)?
        };
        let result = client.run(statement).await?;
        let count = result
            .first_i64("count")
            .ok_or_else(|| eyre!("Count query returned no count for {:?}", target))?;
        Ok(count.max(0) as u64)
    }

    async fn delete(&self, client: &dyn CypherRunner, target: Target<'_>) -> Result<u64> {
        let mut deleted = 0;
        loop {
            let statement = cypher::delete_stale(target, &self.marker, self.batch_size)?;
            let round = client
                .run(statement)
                .await?
                .first_i64("count")
                .unwrap_or(0)
                .max(0) as u64;
            if round == 0 {
                return Ok(deleted);
            }
            deleted += round;
            log::debug!("Deleted {} stale {:?} so far", deleted, target);
        }
    }

    /// Count, check thresholds, then delete unless this is a dry run
    pub async fn run(&mut self) -> Result<StalenessReport> {
        if self.target_nodes.is_empty() && self.target_relations.is_empty() {
            log::warn!("No target_nodes or target_relations configured, nothing to remove");
            return Ok(StalenessReport {
                stats: Vec::new(),
                dry_run: self.dry_run,
            });
        }

        let client = self.client.connect().await?;
        let mut stats = Vec::new();
        for (kind, name) in self.targets() {
            let target = match kind {
                TargetKind::Node => Target::Node(name),
                TargetKind::Relation => Target::Relation(name),
            };
            let total = self.count(client.as_ref(), target, false).await?;
            let stale = self.count(client.as_ref(), target, true).await?;
            log::info!("{} {}: {} of {} stale", kind, name, stale, total);
            stats.push(StalenessStat {
                kind,
                name: name.to_string(),
                total,
                stale,
                deleted: 0,
            });
        }

        let violations = self.violations(&stats);
        if !violations.is_empty() {
            eyre::bail!(
                "Staleness check failed, nothing was deleted:\n  {}",
                violations.join("\n  ")
            );
        }

        if self.dry_run {
            log::info!("Dry run, skipping deletion");
            return Ok(StalenessReport { stats, dry_run: true });
        }

        for stat in stats.iter_mut().filter(|s| s.stale > 0) {
            let target = match stat.kind {
                TargetKind::Node => Target::Node(&stat.name),
                TargetKind::Relation => Target::Relation(&stat.name),
            };
            let deleted = self
                .delete(client.as_ref(), target)
                .await
                .with_context(|| format!("Failed to delete stale {} {}", stat.kind, stat.name))?;
            log::info!("Deleted {} stale {} {}", deleted, stat.kind, stat.name);
            stat.deleted = deleted;
        }

        Ok(StalenessReport {
            stats,
            dry_run: false,
        })
    }
}

impl Scoped for Neo4jStalenessRemovalTask {
    const SCOPE: &'static str = "task.remove_stale_data";
}

impl FromConfig for Neo4jStalenessRemovalTask {
    /// Exactly one of `job_publish_tag` and `ms_to_expire` selects the mode
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        let publish_tag = conf.get_opt_str("job_publish_tag").filter(|t| !t.is_empty());
        let ms_to_expire = if conf.contains("ms_to_expire") {
            Some(conf.get_u64_or("ms_to_expire", 0)?)
        } else {
            None
        };
        let marker = match (publish_tag, ms_to_expire) {
            (Some(tag), None) => StalenessMarker::PublishTag(tag.to_string()),
            (None, Some(ms)) => {
                let min = conf.get_u64_or("min_ms_to_expire", DEFAULT_MIN_MS_TO_EXPIRE)?;
                if ms < min {
                    eyre::bail!("ms_to_expire {} is below the minimum of {}", ms, min);
                }
                StalenessMarker::ExpireMs(ms)
            }
            (Some(_), Some(_)) => {
                eyre::bail!("Set either job_publish_tag or ms_to_expire, not both")
            }
            (None, None) => eyre::bail!("One of job_publish_tag or ms_to_expire is required"),
        };

        let overrides: BTreeMap<String, u64> = match conf.get("staleness_pct_max_dict") {
            Some(value) => serde_json::from_value(value.clone())
                .context("staleness_pct_max_dict must map names to whole percentages")?,
            None => BTreeMap::new(),
        };

        Ok(Self::new(Neo4jClient::from_config(conf)?, marker)
            .with_targets(
                conf.get_str_list("target_nodes")?,
                conf.get_str_list("target_relations")?,
            )
            .with_staleness_max_pct(conf.get_u64_or("staleness_max_pct", DEFAULT_STALENESS_MAX_PCT)?)
            .with_staleness_pct_max(overrides)
            .with_batch_size(conf.get_u64_or("batch_size", DEFAULT_BATCH_SIZE)?)
            .with_dry_run(conf.get_bool_or("dry_run", false)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Auth;
    use crate::neo4j::testing::{MemoryCypher, count};
    use serde_json::json;
    use std::sync::Mutex;

    /// Every target has `total` entities, `stale` of them stale
    fn graph(total: u64, stale: u64) -> MemoryCypher {
        let remaining = Arc::new(Mutex::new(stale));
        MemoryCypher::new(move |statement| {
            let text = &statement.statement;
            if text.contains("LIMIT") {
                let batch_size = statement.parameters["batch_size"].as_u64().unwrap_or(0);
                let mut remaining = remaining.lock().unwrap();
                let deleted = batch_size.min(*remaining);
                *remaining -= deleted;
                Ok(count(deleted))
            } else if text.contains("WHERE") {
                Ok(count(stale))
            } else {
                Ok(count(total))
            }
        })
    }

    fn deletes(runner: &MemoryCypher) -> usize {
        runner
            .statements()
            .iter()
            .filter(|s| s.statement.contains("DELETE"))
            .count()
    }

    fn conf(extra: serde_json::Value) -> ConfigTree {
        let mut value = json!({
            "neo4j_endpoint": "http://localhost:7474",
            "target_nodes": ["Table", "Column"],
            "target_relations": "COLUMN, COLUMN_OF"
        });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        ConfigTree::from_value(value).unwrap()
    }

    fn stat(name: &str, total: u64, stale: u64) -> StalenessStat {
        StalenessStat {
            kind: TargetKind::Node,
            name: name.to_string(),
            total,
            stale,
            deleted: 0,
        }
    }

    #[test]
    fn test_from_config_modes() {
        let task = Neo4jStalenessRemovalTask::from_config(&conf(json!({"job_publish_tag": "2024-01-02"}))).unwrap();
        assert_eq!(task.marker, StalenessMarker::PublishTag("2024-01-02".to_string()));
        assert_eq!(task.target_relations, vec!["COLUMN", "COLUMN_OF"]);
        assert_eq!(task.batch_size, DEFAULT_BATCH_SIZE);

        let task = Neo4jStalenessRemovalTask::from_config(&conf(json!({"ms_to_expire": 172_800_000u64}))).unwrap();
        assert_eq!(task.marker, StalenessMarker::ExpireMs(172_800_000));

        assert!(Neo4jStalenessRemovalTask::from_config(&conf(json!({}))).is_err());
        assert!(
            Neo4jStalenessRemovalTask::from_config(&conf(json!({"job_publish_tag": "t", "ms_to_expire": 172_800_000u64})))
                .is_err()
        );
        let err = Neo4jStalenessRemovalTask::from_config(&conf(json!({"ms_to_expire": 1000})))
            .err()
            .unwrap();
        assert!(err.to_string().contains("below the minimum"));
    }

    #[test]
    fn test_thresholds() {
        let task = Neo4jStalenessRemovalTask::from_config(&conf(json!({
            "job_publish_tag": "t",
            "staleness_max_pct": 10,
            "staleness_pct_max_dict": {"Column": 50}
        })))
        .unwrap();

        assert!(task.violations(&[stat("Table", 100, 10)]).is_empty());
        assert!(task.violations(&[stat("Column", 10, 5)]).is_empty());
        assert!(task.violations(&[stat("Empty", 0, 0)]).is_empty());

        let violations = task.violations(&[stat("Table", 100, 11), stat("Column", 10, 6)]);
        assert_eq!(violations.len(), 2);
        assert!(violations[0].starts_with("node Table: 11 of 100 stale"));
    }

    #[test]
    fn test_stale_pct() {
        assert_eq!(stat("Table", 0, 0).stale_pct(), 0.0);
        assert_eq!(stat("Table", 200, 50).stale_pct(), 25.0);
    }

    #[tokio::test]
    async fn test_run_without_targets_does_nothing() {
        let client = Neo4jClient::try_new("http://127.0.0.1:9", Auth::None, "neo4j").unwrap();
        let mut task = Neo4jStalenessRemovalTask::new(client, StalenessMarker::PublishTag("t".into()))
            .with_dry_run(true);
        let report = task.run().await.unwrap();
        assert!(report.stats.is_empty());
        assert!(report.dry_run);
        assert_eq!(report.deleted(), 0);
    }

    #[tokio::test]
    async fn test_run_deletes_in_rounds_until_empty() {
        let runner = graph(100, 5);
        let mut task = Neo4jStalenessRemovalTask::new(runner.clone(), StalenessMarker::PublishTag("t".into()))
            .with_targets(vec!["Table".to_string()], Vec::new())
            .with_batch_size(2);

        let report = task.run().await.unwrap();
        assert!(!report.dry_run);
        assert_eq!(report.stats[0].total, 100);
        assert_eq!(report.stats[0].stale, 5);
        assert_eq!(report.deleted(), 5);
        assert_eq!(deletes(&runner), 4);
    }

    #[tokio::test]
    async fn test_threshold_breach_aborts_before_any_delete() {
        let runner = graph(100, 5);
        let mut overrides = BTreeMap::new();
        overrides.insert("COLUMN".to_string(), 1);
        let mut task = Neo4jStalenessRemovalTask::new(runner.clone(), StalenessMarker::PublishTag("t".into()))
            .with_targets(vec!["Table".to_string()], vec!["COLUMN".to_string()])
            .with_staleness_pct_max(overrides);

        let err = task.run().await.unwrap_err();
        assert!(err.to_string().contains("nothing was deleted"));
        assert!(err.to_string().contains("relationship COLUMN: 5 of 100 stale"));
        assert_eq!(runner.statements().len(), 4);
        assert_eq!(deletes(&runner), 0);
    }

    #[tokio::test]
    async fn test_dry_run_counts_only() {
        let runner = graph(10, 1);
        let mut task = Neo4jStalenessRemovalTask::new(runner.clone(), StalenessMarker::ExpireMs(DEFAULT_MIN_MS_TO_EXPIRE))
            .with_targets(vec!["Table".to_string()], Vec::new())
            .with_staleness_max_pct(10)
            .with_dry_run(true);

        let report = task.run().await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.stats[0].stale, 1);
        assert_eq!(report.deleted(), 0);
        assert_eq!(deletes(&runner), 0);
    }
}
