//! Directory listing tool.

use std::sync::Arc;

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::{Tool, ToolOutput};

use crate::path_guard::PathGuard;

const MAX_ENTRIES: usize = 500;

pub struct ListDirectoryTool {
    guard: Arc<PathGuard>,
}

impl ListDirectoryTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

impl Default for ListDirectoryTool {
    fn default() -> Self {
        Self::new(Arc::new(PathGuard::unrestricted()))
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory, sorted by name. Subdirectories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (defaults to the workspace root or current directory)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"].as_str().unwrap_or(".");
        let resolved = self.guard.resolve(self.name(), path)?;

        let mut reader = match tokio::fs::read_dir(&resolved).await {
            Ok(r) => r,
            Err(e) => return Ok(ToolOutput::failed(format!("Failed to list directory: {e}"))),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                        name.push('/');
                    }
                    entries.push(name);
                }
                Ok(None) => break,
                Err(e) => return Ok(ToolOutput::failed(format!("Failed to list directory: {e}"))),
            }
        }
        entries.sort();

        let total = entries.len();
        let mut output = if entries.is_empty() {
            format!("{} is empty", resolved.display())
        } else {
            entries.iter().take(MAX_ENTRIES).cloned().collect::<Vec<_>>().join("\n")
        };
        if total > MAX_ENTRIES {
            output.push_str(&format!("\n[{} more entries]", total - MAX_ENTRIES));
        }

        Ok(ToolOutput::ok(output).with_data(serde_json::json!({
            "path": resolved.display().to_string(),
            "entries": entries,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let result = ListDirectoryTool::default()
            .execute(serde_json::json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "a.txt\nb.txt\nsub/");
        assert_eq!(result.data.unwrap()["entries"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn defaults_to_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only.txt"), "").unwrap();
        let tool = ListDirectoryTool::new(Arc::new(PathGuard::new(Some(dir.path().to_path_buf()))));

        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(result.output, "only.txt");
    }

    #[tokio::test]
    async fn empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = ListDirectoryTool::default()
            .execute(serde_json::json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.output.ends_with("is empty"));
    }

    #[tokio::test]
    async fn missing_directory_fails_softly() {
        let result = ListDirectoryTool::default()
            .execute(serde_json::json!({"path": "/definitely/not/here"}))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
