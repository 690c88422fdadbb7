//! File read tool: read file contents with path validation.

use std::sync::Arc;

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::{Tool, ToolOutput};

use crate::path_guard::PathGuard;

/// Larger files are cut to this many bytes.
pub const MAX_READ_BYTES: usize = 64 * 1024;

pub struct FileReadTool {
    guard: Arc<PathGuard>,
}

impl FileReadTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self { guard }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new(Arc::new(PathGuard::unrestricted()))
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let resolved = self.guard.resolve(self.name(), path)?;

        match tokio::fs::read(&resolved).await {
            Ok(bytes) => {
                let total = bytes.len();
                let mut content = String::from_utf8_lossy(&bytes).into_owned();
                if content.len() > MAX_READ_BYTES {
                    let mut end = MAX_READ_BYTES;
                    while !content.is_char_boundary(end) {
                        end -= 1;
                    }
                    content.truncate(end);
                    content.push_str(&format!("\n[truncated: {total} bytes total]"));
                }
                Ok(ToolOutput::ok(content).with_data(serde_json::json!({
                    "path": resolved.display().to_string(),
                    "bytes": total,
                })))
            }
            Err(e) => Ok(ToolOutput::failed(format!("Failed to read file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tool_definition() {
        let tool = FileReadTool::default();
        assert_eq!(tool.name(), "file_read");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
        assert!(schema["properties"]["path"].is_object());
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("test.txt");
        let mut f = std::fs::File::create(&file_path).unwrap();
        writeln!(f, "Hello, world!").unwrap();

        let tool = FileReadTool::default();
        let result = tool
            .execute(serde_json::json!({ "path": file_path.to_str().unwrap() }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("Hello, world!"));
    }

    #[tokio::test]
    async fn read_relative_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "remember the milk").unwrap();

        let tool = FileReadTool::new(Arc::new(PathGuard::new(Some(dir.path().to_path_buf()))));
        let result = tool.execute(serde_json::json!({"path": "notes.md"})).await.unwrap();
        assert_eq!(result.output, "remember the milk");
    }

    #[tokio::test]
    async fn large_files_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("big.txt");
        std::fs::write(&file_path, "x".repeat(MAX_READ_BYTES + 10)).unwrap();

        let result = FileReadTool::default()
            .execute(serde_json::json!({"path": file_path.to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.output.ends_with(&format!("[truncated: {} bytes total]", MAX_READ_BYTES + 10)));
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let result = FileReadTool::default()
            .execute(serde_json::json!({"path": missing.to_str().unwrap()}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("Failed to read file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let result = FileReadTool::default().execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn path_traversal_blocked() {
        let result = FileReadTool::default()
            .execute(serde_json::json!({"path": "../../../etc/passwd"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
