//! System prompt loading.
//!
//! The prompt file may carry editor notes after a `---` line; only the text
//! above the first such line is sent to the model.

use crate::error::PromptError;
use std::path::Path;
use synth_relay_core::Result;

const SEPARATOR: &str = "---";

/// Returns the prompt text above the first line that is exactly `---`, trimmed.
#[must_use]
pub fn extract_prompt(text: &str) -> String {
    let mut prompt = String::new();
    for line in text.lines() {
        if line.trim_end_matches('\r') == SEPARATOR {
            break;
        }
        prompt.push_str(line);
        prompt.push('\n');
    }
    prompt.trim().to_string()
}

/// Reads and extracts the system prompt from `path`.
///
/// # Errors
///
/// Returns an error if the file is missing or unreadable.
pub async fn load_system_prompt(path: &Path) -> Result<String, PromptError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PromptError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            PromptError::ReadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;
    Ok(extract_prompt(&text))
}
