//! Memory block store.
//!
//! A directory of small YAML snippets, each maintained independently by
//! outside tooling:
//!
//! ```yaml
//! sort_key: 10
//! value: |
//!   Tim prefers short answers.
//! ```
//!
//! The block name is the file stem. Blocks render in ascending `sort_key`
//! order (default 100), ties broken by file name. The store is read-only here.

use crate::error::MemoryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use synth_relay_core::Result;
use tracing::{debug, warn};

/// Sort key for blocks that do not declare one.
pub const DEFAULT_SORT_KEY: i64 = 100;

const MEMORY_HEADER: &str = "[Memory blocks: what you carry between conversations]\n";
const MEMORY_FOOTER: &str = "\n[End of memory blocks]\n---\n\n";

/// A persisted context snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    /// Block name, from the file stem.
    pub name: String,
    /// Block text.
    pub value: String,
    /// Render order; lower renders first.
    pub sort_key: i64,
}

#[derive(Debug, Deserialize)]
struct MemoryFile {
    value: String,
    #[serde(default = "default_sort_key", alias = "sort")]
    sort_key: i64,
}

fn default_sort_key() -> i64 {
    DEFAULT_SORT_KEY
}

/// Reads memory blocks from a directory.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    dir: PathBuf,
}

impl MemoryStore {
    /// Creates a store over `dir`. The directory need not exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads every parseable block, sorted for rendering.
    ///
    /// Unparseable snippets are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory exists but cannot be listed.
    pub async fn load(&self) -> Result<Vec<MemoryBlock>, MemoryError> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let list_failed = |e: std::io::Error| MemoryError::ListFailed {
            dir: self.dir.clone(),
            reason: e.to_string(),
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(list_failed)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_failed)? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut blocks = Vec::with_capacity(paths.len());
        for path in paths {
            match load_block(&path).await {
                Ok(block) => blocks.push(block),
                Err(report) => warn!(error = %report, "skipping memory block"),
            }
        }
        blocks.sort_by_key(|block| block.sort_key);

        debug!(blocks = blocks.len(), dir = %self.dir.display(), "memory loaded");
        Ok(blocks)
    }

    /// Renders all blocks into one prefix, or an empty string if there is
    /// nothing to render.
    pub async fn render(&self) -> String {
        match self.load().await {
            Ok(blocks) => render_blocks(&blocks),
            Err(report) => {
                warn!(error = %report, "memory store unavailable");
                String::new()
            }
        }
    }
}

async fn load_block(path: &Path) -> Result<MemoryBlock, MemoryError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MemoryError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let file: MemoryFile = serde_yaml::from_str(&text).map_err(|e| MemoryError::ParseFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(MemoryBlock {
        name,
        value: file.value,
        sort_key: file.sort_key,
    })
}

/// Renders already-sorted blocks as `[name]\nvalue` sections wrapped in a
/// header and footer.
#[must_use]
pub fn render_blocks(blocks: &[MemoryBlock]) -> String {
    if blocks.is_empty() {
        return String::new();
    }

    let body = blocks
        .iter()
        .map(|block| format!("[{}]\n{}", block.name, block.value.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{MEMORY_HEADER}{body}{MEMORY_FOOTER}")
}
