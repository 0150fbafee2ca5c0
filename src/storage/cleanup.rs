//! Staging cleanup after a successful publish

use crate::etl::Callback;
use eyre::{Context, Report, Result};
use std::path::{Path, PathBuf};

/// Removes staging paths once their contents have been published
///
/// Paths are kept after a failed publish so the run can be inspected or
/// published again.
#[derive(Debug, Clone, Default)]
pub struct CleanupStagingCallback {
    paths: Vec<PathBuf>,
}

impl CleanupStagingCallback {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
        }
    }
}

impl Callback for CleanupStagingCallback {
    fn on_success(&self) -> Result<()> {
        for path in &self.paths {
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else if path.exists() {
                std::fs::remove_file(path)
            } else {
                continue;
            };
            removed.with_context(|| format!("Failed to remove staging path {}", path.display()))?;
            log::debug!("Removed staging path {}", path.display());
        }
        Ok(())
    }

    fn on_failure(&self, _error: &Report) -> Result<()> {
        for path in self.paths.iter().filter(|p| p.exists()) {
            log::info!("Keeping staging path {} after failed publish", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_removes_on_success_only() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nodes");
        let file = temp.path().join("docs.json");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Table_0.csv"), "KEY\n").unwrap();
        std::fs::write(&file, "{}\n").unwrap();

        let callback = CleanupStagingCallback::new([&dir, &file, &temp.path().join("missing")]);
        callback.on_failure(&eyre::eyre!("boom")).unwrap();
        assert!(dir.exists());
        assert!(file.exists());

        callback.on_success().unwrap();
        assert!(!dir.exists());
        assert!(!file.exists());
    }
}
