//! Neo4j CSV staging files
//!
//! Graph records are staged as CSV before publishing: one directory of node
//! files and one of relationship files. Every file holds a single header, so
//! records with a different attribute set for the same label (or relationship
//! triple) go to a new file with the next index.
//!
//! Cells of non-string attributes carry a `:UNQUOTED` header suffix and hold
//! JSON literals, so numbers and booleans survive the round trip.

use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Loader;
use crate::models::{GraphRecord, UNQUOTED_SUFFIX, serialize_node, serialize_relationship};
use eyre::{Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

type WriterKey = (String, Vec<String>);

/// Loader writing graph records as Neo4j CSV staging files
///
/// # Example
/// ```no_run
/// use databuilder::etl::Loader;
/// use databuilder::models::{GraphRecord, TableMetadata};
/// use databuilder::storage::FsNeo4jCsvLoader;
///
/// # async fn example() -> eyre::Result<()> {
/// let mut loader = FsNeo4jCsvLoader::new("/tmp/nodes", "/tmp/relationships", true)?;
/// let table: GraphRecord = Box::new(TableMetadata::new("hive", "gold", "core", "orders"));
/// loader.load(table).await?;
/// loader.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct FsNeo4jCsvLoader {
    node_dir: PathBuf,
    relation_dir: PathBuf,
    node_writers: HashMap<WriterKey, csv::Writer<File>>,
    relation_writers: HashMap<WriterKey, csv::Writer<File>>,
    file_indexes: HashMap<String, usize>,
}

impl FsNeo4jCsvLoader {
    /// Prepare both staging directories
    ///
    /// # Errors
    /// Returns an error if a directory already has files and
    /// `force_create_directory` is false
    pub fn new(
        node_dir: impl AsRef<Path>,
        relation_dir: impl AsRef<Path>,
        force_create_directory: bool,
    ) -> Result<Self> {
        let node_dir = node_dir.as_ref().to_path_buf();
        let relation_dir = relation_dir.as_ref().to_path_buf();
        prepare_directory(&node_dir, force_create_directory)?;
        prepare_directory(&relation_dir, force_create_directory)?;

        Ok(Self {
            node_dir,
            relation_dir,
            node_writers: HashMap::new(),
            relation_writers: HashMap::new(),
            file_indexes: HashMap::new(),
        })
    }

    pub fn node_dir(&self) -> &Path {
        &self.node_dir
    }

    pub fn relation_dir(&self) -> &Path {
        &self.relation_dir
    }

    fn write_row(
        writers: &mut HashMap<WriterKey, csv::Writer<File>>,
        file_indexes: &mut HashMap<String, usize>,
        dir: &Path,
        stem: String,
        row: Vec<(String, String)>,
    ) -> Result<()> {
        let (headers, cells): (Vec<String>, Vec<String>) = row.into_iter().unzip();
        let key = (stem, headers);

        if !writers.contains_key(&key) {
            let index = file_indexes.entry(key.0.clone()).or_insert(0);
            let path = dir.join(format!("{}_{}.csv", key.0, index));
            *index += 1;

            log::debug!("Creating staging file {}", path.display());
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            writer
                .write_record(&key.1)
                .with_context(|| format!("Failed to write header to {}", path.display()))?;
            writers.insert(key.clone(), writer);
        }

        if let Some(writer) = writers.get_mut(&key) {
            writer
                .write_record(&cells)
                .with_context(|| format!("Failed to write row for {}", key.0))?;
        }
        Ok(())
    }
}

impl Scoped for FsNeo4jCsvLoader {
    const SCOPE: &'static str = "loader.filesystem_csv_neo4j";
}

impl FromConfig for FsNeo4jCsvLoader {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Self::new(
            conf.get_str("node_dir_path")?,
            conf.get_str("relationship_dir_path")?,
            conf.get_bool_or("force_create_directory", false)?,
        )
    }
}

impl Loader for FsNeo4jCsvLoader {
    type Item = GraphRecord;

    async fn load(&mut self, record: Self::Item) -> Result<()> {
        for node in record.nodes() {
            Self::write_row(
                &mut self.node_writers,
                &mut self.file_indexes,
                &self.node_dir,
                node.label.clone(),
                serialize_node(&node),
            )?;
        }
        for relationship in record.relationships() {
            let stem = format!(
                "{}_{}_{}",
                relationship.start_label, relationship.end_label, relationship.relationship_type
            );
            Self::write_row(
                &mut self.relation_writers,
                &mut self.file_indexes,
                &self.relation_dir,
                stem,
                serialize_relationship(&relationship),
            )?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        for writer in self
            .node_writers
            .values_mut()
            .chain(self.relation_writers.values_mut())
        {
            writer.flush().context("Failed to flush staging file")?;
        }
        log::info!(
            "Staged {} node file(s) in {} and {} relationship file(s) in {}",
            self.node_writers.len(),
            self.node_dir.display(),
            self.relation_writers.len(),
            self.relation_dir.display()
        );
        Ok(())
    }
}

fn prepare_directory(dir: &Path, force: bool) -> Result<()> {
    if dir.exists() {
        let has_entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .next()
            .is_some();
        if has_entries {
            if !force {
                eyre::bail!(
                    "Staging directory {} is not empty, set force_create_directory to replace it",
                    dir.display()
                );
            }
            log::info!("Removing existing staging directory {}", dir.display());
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
        }
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}

/// Reads staged CSV files back into typed rows
pub struct Neo4jCsvReader;

impl Neo4jCsvReader {
    /// Every `.csv` file in a directory, sorted by name
    pub fn list_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("csv"))
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }

    /// Read a file as rows of header → value
    ///
    /// `:UNQUOTED` headers lose their suffix and their cells are parsed as
    /// JSON; empty unquoted cells are left out of the row.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<Map<String, Value>>> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let headers: Vec<(String, bool)> = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(|header| match header.strip_suffix(UNQUOTED_SUFFIX) {
                Some(name) => (name.to_string(), true),
                None => (header.to_string(), false),
            })
            .collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("Failed to read row {} of {}", line + 1, path.display()))?;
            let mut row = Map::new();
            for ((name, unquoted), cell) in headers.iter().zip(record.iter()) {
                if !unquoted {
                    row.insert(name.clone(), Value::String(cell.to_string()));
                } else if !cell.is_empty() {
                    let value = serde_json::from_str(cell).with_context(|| {
                        format!("Invalid value '{}' for {} in {}", cell, name, path.display())
                    })?;
                    row.insert(name.clone(), value);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnMetadata, GraphNode, GraphRelationship, GraphSerializable, TableMetadata};
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Mixed;

    impl GraphSerializable for Mixed {
        fn nodes(&self) -> Vec<GraphNode> {
            vec![
                GraphNode::new("a", "Tag").with_attribute("tag_type", "default"),
                GraphNode::new("b", "Tag").with_attribute("tag_type", "default"),
                GraphNode::new("c", "Tag").with_attribute("weight", 3),
            ]
        }

        fn relationships(&self) -> Vec<GraphRelationship> {
            vec![GraphRelationship::new(("Tag", "a"), ("Tag", "b"), "RELATED", "RELATED_OF")]
        }
    }

    fn sample_table() -> TableMetadata {
        TableMetadata::new("hive", "gold", "core", "orders")
            .with_description("All orders")
            .with_columns(vec![ColumnMetadata::new("id", "bigint", 0)])
    }

    #[tokio::test]
    async fn test_writes_one_file_per_header() {
        let temp = TempDir::new().unwrap();
        let nodes = temp.path().join("nodes");
        let rels = temp.path().join("relationships");

        let mut loader = FsNeo4jCsvLoader::new(&nodes, &rels, false).unwrap();
        loader.load(Box::new(Mixed)).await.unwrap();
        loader.close().await.unwrap();

        let node_files = Neo4jCsvReader::list_files(&nodes).unwrap();
        let names: Vec<String> = node_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Tag_0.csv", "Tag_1.csv"]);

        let rows = Neo4jCsvReader::read(&node_files[0]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["KEY"], "b");

        let rows = Neo4jCsvReader::read(&node_files[1]).unwrap();
        assert_eq!(rows[0]["weight"], json!(3));

        let rel_files = Neo4jCsvReader::list_files(&rels).unwrap();
        assert_eq!(
            rel_files[0].file_name().unwrap().to_string_lossy(),
            "Tag_Tag_RELATED_0.csv"
        );
    }

    #[tokio::test]
    async fn test_round_trips_typed_attributes() {
        let temp = TempDir::new().unwrap();
        let nodes = temp.path().join("nodes");
        let rels = temp.path().join("relationships");

        let mut loader = FsNeo4jCsvLoader::new(&nodes, &rels, false).unwrap();
        loader.load(Box::new(sample_table())).await.unwrap();
        loader.close().await.unwrap();

        let table_file = nodes.join("Table_0.csv");
        let rows = Neo4jCsvReader::read(&table_file).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["KEY"], "hive://gold.core/orders");
        assert_eq!(rows[0]["is_view"], json!(false));

        let column_rows = Neo4jCsvReader::read(nodes.join("Column_0.csv")).unwrap();
        assert_eq!(column_rows[0]["sort_order"], json!(0));
        assert_eq!(column_rows[0]["col_type"], "bigint");
    }

    #[tokio::test]
    async fn test_existing_directory_requires_force() {
        let temp = TempDir::new().unwrap();
        let nodes = temp.path().join("nodes");
        let rels = temp.path().join("relationships");
        std::fs::create_dir_all(&nodes).unwrap();
        std::fs::write(nodes.join("stale.csv"), "KEY,LABEL\n").unwrap();

        let err = FsNeo4jCsvLoader::new(&nodes, &rels, false).err().unwrap();
        assert!(err.to_string().contains("not empty"));

        FsNeo4jCsvLoader::new(&nodes, &rels, true).unwrap();
        assert!(Neo4jCsvReader::list_files(&nodes).unwrap().is_empty());
    }

    #[test]
    fn test_empty_unquoted_cells_are_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Table_0.csv");
        std::fs::write(&path, "KEY,LABEL,note,rows:UNQUOTED\nt,Table,,\n").unwrap();

        let rows = Neo4jCsvReader::read(&path).unwrap();
        assert_eq!(rows[0]["note"], "");
        assert!(!rows[0].contains_key("rows"));
    }

    #[test]
    fn test_from_config() {
        let temp = TempDir::new().unwrap();
        let conf = ConfigTree::from_pairs([
            ("node_dir_path", temp.path().join("n").to_string_lossy().into_owned()),
            (
                "relationship_dir_path",
                temp.path().join("r").to_string_lossy().into_owned(),
            ),
        ]);
        let loader = FsNeo4jCsvLoader::from_config(&conf).unwrap();
        assert!(loader.node_dir().is_dir());
        assert!(loader.relation_dir().is_dir());
    }
}
