//! NDJSON (Newline Delimited JSON) staging files for search documents

use crate::config::{ConfigTree, FromConfig, Scoped};
use crate::etl::Loader;

use eyre::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Read NDJSON from a file
pub struct NdjsonReader {
    path: PathBuf,
}

impl NdjsonReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read all lines as JSON values, skipping blank lines
    pub fn read(&self) -> Result<Vec<Value>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to read NDJSON file: {}", self.path.display()))?;

        let mut documents = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read line {} of {}", index + 1, self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            documents.push(
                serde_json::from_str(&line)
                    .with_context(|| format!("Failed to parse JSON line {}: {}", index + 1, line))?,
            );
        }
        Ok(documents)
    }
}

/// Loader writing one search document per line
///
/// The file is truncated when the loader is created.
pub struct FsElasticsearchJsonLoader {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl FsElasticsearchJsonLoader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create NDJSON file: {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Scoped for FsElasticsearchJsonLoader {
    const SCOPE: &'static str = "loader.filesystem.elasticsearch";
}

impl FromConfig for FsElasticsearchJsonLoader {
    fn from_config(conf: &ConfigTree) -> Result<Self> {
        Self::new(conf.get_str("file_path")?)
    }
}

impl Loader for FsElasticsearchJsonLoader {
    type Item = Value;

    async fn load(&mut self, document: Self::Item) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &document)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to write NDJSON file: {}", self.path.display()))?;
        log::info!("Staged {} document(s) in {}", self.written, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("search").join("tables.json");

        let mut loader = FsElasticsearchJsonLoader::new(&path).unwrap();
        let data = vec![json!({"name": "orders"}), json!({"name": "users", "tags": ["pii"]})];
        for document in data.clone() {
            loader.load(document).await.unwrap();
        }
        loader.close().await.unwrap();

        let read_data = NdjsonReader::new(&path).read().unwrap();
        assert_eq!(data, read_data);
    }

    #[tokio::test]
    async fn test_truncates_on_create() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("docs.json");
        std::fs::write(&path, "{\"old\": true}\n").unwrap();

        let mut loader = FsElasticsearchJsonLoader::new(&path).unwrap();
        loader.close().await.unwrap();

        assert!(NdjsonReader::new(&path).read().unwrap().is_empty());
    }

    #[test]
    fn test_read_skips_blank_lines_and_reports_bad_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("docs.json");
        std::fs::write(&path, "{\"a\": 1}\n\n{\"b\": 2}\n").unwrap();
        assert_eq!(NdjsonReader::new(&path).read().unwrap().len(), 2);

        std::fs::write(&path, "{\"a\": 1}\nnot json\n").unwrap();
        let err = NdjsonReader::new(&path).read().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
