//! Builtin tools: clock, notes, and a read-only view of one directory.

use crate::error::ToolError;
use crate::tool::{Tool, ToolArguments, ToolRegistry};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn required<'a>(tool: &str, arguments: &'a ToolArguments, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ToolError::InvalidInput {
            name: tool.to_string(),
            reason: format!("missing '{key}'"),
        })
}

/// Reduces a requested filename to its last path component.
///
/// Returns `None` when nothing usable remains (`""`, `"/"`, `".."`).
#[must_use]
pub fn sanitize_filename(requested: &str) -> Option<&str> {
    requested
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .filter(|segment| *segment != "." && *segment != "..")
}

/// Reports the wall clock time.
#[derive(Debug, Clone, Default)]
pub struct CheckTime;

#[async_trait]
impl Tool for CheckTime {
    fn name(&self) -> &str {
        "check_time"
    }

    fn description(&self) -> &str {
        "Get the current time and date"
    }

    fn parameters_schema(&self) -> JsonValue {
        serde_json::json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
        Ok(now_iso8601())
    }
}

/// Appends timestamped lines to a notes file.
#[derive(Debug, Clone)]
pub struct TakeNote {
    path: PathBuf,
}

impl TakeNote {
    /// Creates the tool over the given notes file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Tool for TakeNote {
    fn name(&self) -> &str {
        "take_note"
    }

    fn description(&self) -> &str {
        "Append a note to your notes file. Use this to remember things."
    }

    fn parameters_schema(&self) -> JsonValue {
        serde_json::json!({
            "type": "object",
            "properties": {
                "note": { "type": "string", "description": "The note content to save" }
            },
            "required": ["note"]
        })
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let note = required(self.name(), arguments, "note")?;
        let failed = |e: std::io::Error| ToolError::ExecutionFailed {
            name: "take_note".to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(failed)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(failed)?;
        let line = format!("\n[{}] {note}", now_iso8601());
        file.write_all(line.as_bytes()).await.map_err(failed)?;
        file.flush().await.map_err(failed)?;

        Ok(format!("Note saved: \"{note}\""))
    }
}

/// Reads a file from one directory, never outside it.
#[derive(Debug, Clone)]
pub struct ReadFile {
    dir: PathBuf,
}

impl ReadFile {
    /// Creates the tool over the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in your scaffolding/ directory"
    }

    fn parameters_schema(&self) -> JsonValue {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": { "type": "string", "description": "The filename to read (within scaffolding/)" }
            },
            "required": ["filename"]
        })
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let requested = required(self.name(), arguments, "filename")?;
        let Some(name) = sanitize_filename(requested) else {
            return Ok(format!("File not found: {requested}"));
        };

        let path = self.dir.join(name);
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Ok(format!("File not found: {name}"));
        }

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "read_file".to_string(),
                reason: e.to_string(),
            })
    }
}

/// Lists the entries of one directory.
#[derive(Debug, Clone)]
pub struct ListFiles {
    dir: PathBuf,
}

impl ListFiles {
    /// Creates the tool over the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Tool for ListFiles {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in your scaffolding/ directory"
    }

    fn parameters_schema(&self) -> JsonValue {
        serde_json::json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
        let failed = |e: std::io::Error| ToolError::ExecutionFailed {
            name: "list_files".to_string(),
            reason: e.to_string(),
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(failed)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(failed)? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

/// Builds the standard registry: `check_time`, `take_note`, `read_file` and
/// `list_files`, with the file tools confined to `scaffolding_dir`.
#[must_use]
pub fn builtin_registry(scaffolding_dir: &Path, notes_file: &Path) -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(CheckTime)
        .with_tool(TakeNote::new(notes_file))
        .with_tool(ReadFile::new(scaffolding_dir))
        .with_tool(ListFiles::new(scaffolding_dir))
}
