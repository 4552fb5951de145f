// File: testing-framework/src/foundation/workspace.rs
//
// Node Workspaces
//
// RAII-managed base directory of a foundation. Every node gets a data
// directory and a log file underneath it. The directory is removed when the
// workspace is dropped unless it was explicitly retained for inspection.

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary directory holding node data and logs of one foundation.
pub struct NodeWorkspace {
    /// `None` once retained
    temp_dir: Option<TempDir>,
    path: PathBuf,
}

impl NodeWorkspace {
    /// Create a fresh workspace whose directory name starts with `label`.
    pub fn new(label: &str) -> Result<Self> {
        let prefix = format!("spectre_{}_", sanitize(label));
        let temp_dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir()
            .context("Failed to create foundation workspace")?;
        let path = temp_dir.path().to_path_buf();

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Created foundation workspace at: {:?}", path);
        }

        Ok(Self {
            temp_dir: Some(temp_dir),
            path,
        })
    }

    /// Workspace root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data directory of `node`, created on first use.
    pub fn node_dir(&self, node: &str) -> Result<PathBuf> {
        let dir = self.path.join(sanitize(node));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {:?}", dir))?;
        Ok(dir)
    }

    /// Log file of `node`
    pub fn log_path(&self, node: &str) -> PathBuf {
        self.path.join(format!("{}.log", sanitize(node)))
    }

    /// Keep the directory on disk and return its path.
    pub fn retain(mut self) -> PathBuf {
        if let Some(temp_dir) = self.temp_dir.take() {
            let _ = temp_dir.keep();
        }
        log::info!("Retained foundation workspace at {:?}", self.path);
        self.path.clone()
    }
}

impl Drop for NodeWorkspace {
    fn drop(&mut self) {
        if self.temp_dir.is_some() && log::log_enabled!(log::Level::Debug) {
            log::debug!("Cleaning up foundation workspace at: {:?}", self.path);
        }
    }
}

/// Keep file names portable: suite ids and node names may contain spaces.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_on_drop() {
        let path = {
            let workspace = NodeWorkspace::new("cleanup").unwrap();
            let dir = workspace.node_dir("alice").unwrap();
            assert!(dir.exists());
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_retain_keeps_directory() {
        let workspace = NodeWorkspace::new("END TO END MVP").unwrap();
        std::fs::write(workspace.log_path("spectre-collator"), b"log").unwrap();

        let kept = workspace.retain();
        assert!(kept.join("spectre-collator.log").exists());
        assert!(kept
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("spectre_END_TO_END_MVP_"));
        std::fs::remove_dir_all(kept).unwrap();
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a b/c"), "a_b_c");
        assert_eq!(sanitize("relay-01_x"), "relay-01_x");
    }
}
