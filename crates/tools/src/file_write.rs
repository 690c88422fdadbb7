//! File write tool: create or overwrite a file inside the workspace.

use std::sync::Arc;

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::{Tool, ToolOutput};
use tracing::debug;

use crate::path_guard::PathGuard;

pub struct FileWriteTool {
    guard: Arc<PathGuard>,
}

impl FileWriteTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

impl Default for FileWriteTool {
    fn default() -> Self {
        Self::new(Arc::new(PathGuard::unrestricted()))
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating parent directories as needed. Overwrites existing files unless append is set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting",
                    "default": false
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let append = arguments["append"].as_bool().unwrap_or(false);

        let resolved = self.guard.resolve(self.name(), path)?;

        if let Some(parent) = resolved.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolOutput::failed(format!("Failed to create directory: {e}")));
        }

        let written = if append {
            use tokio::io::AsyncWriteExt;
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .await
            {
                Ok(mut file) => file.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(&resolved, content).await
        };

        match written {
            Ok(()) => {
                debug!(path = %resolved.display(), bytes = content.len(), append, "File written");
                Ok(ToolOutput::ok(format!(
                    "Wrote {} bytes to {}",
                    content.len(),
                    resolved.display()
                )))
            }
            Err(e) => Ok(ToolOutput::failed(format!("Failed to write file: {e}"))),
        }
    }
}
