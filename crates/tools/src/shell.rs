//! Shell tool: run allowlisted commands.
//!
//! Only the first word of the command is checked against the allowlist, so
//! command chaining and substitution are refused outright.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::{Tool, ToolOutput};
use tokio::process::Command;
use tracing::{debug, warn};

const CHAINING: &[&str] = &[";", "&&", "||", "|", "`", "$(", ">", "<", "\n"];
const MAX_OUTPUT_CHARS: usize = 16_000;

pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    workdir: Option<PathBuf>,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self {
            allowed_commands,
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    fn check(&self, command: &str) -> Result<(), String> {
        if let Some(op) = CHAINING.iter().find(|op| command.contains(**op)) {
            return Err(format!("'{}' is not allowed in commands", op.escape_default()));
        }
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        let base = command.split_whitespace().next().unwrap_or("");
        if self.allowed_commands.iter().any(|a| a == base) {
            Ok(())
        } else {
            Err(format!("command '{base}' is not in the allowlist"))
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute an allowlisted shell command and return its stdout and stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let command = arguments["command"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        self.check(command).map_err(|reason| ToolError::PermissionDenied {
            tool_name: "shell".into(),
            reason,
        })?;

        debug!(command = %command, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        // the orchestrator's timeout drops this future; take the child with it
        cmd.kill_on_drop(true).stdin(Stdio::null());

        let output = cmd.output().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "shell".into(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let success = output.status.success();

        let mut text = if success {
            if stderr.trim().is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };
        if text.chars().count() > MAX_OUTPUT_CHARS {
            text = text.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n[output truncated]";
        }

        let exit_code = output.status.code();
        let result = if success {
            ToolOutput::ok(text.trim())
        } else {
            ToolOutput::failed(text.trim())
        };
        Ok(result.with_data(serde_json::json!({ "exit_code": exit_code })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::descriptor::ToolCategory;

    #[test]
    fn allowlist_check() {
        let tool = ShellTool::new(vec!["ls".into(), "cat".into(), "git".into()]);
        assert!(tool.check("ls -la").is_ok());
        assert!(tool.check("git status").is_ok());
        assert!(tool.check("rm -rf /").is_err());
        assert!(tool.check("sudo something").is_err());
    }

    #[test]
    fn chaining_is_refused() {
        let tool = ShellTool::new(vec!["ls".into()]);
        assert!(tool.check("ls; rm -rf /").is_err());
        assert!(tool.check("ls && curl evil").is_err());
        assert!(tool.check("ls $(whoami)").is_err());
        assert!(tool.check("ls | sh").is_err());
    }

    #[test]
    fn empty_allowlist_allows_any_single_command() {
        let tool = ShellTool::new(vec![]);
        assert!(tool.check("anything goes").is_ok());
    }

    #[test]
    fn inferred_as_dangerous_shell_tool() {
        let d = ShellTool::new(vec![]).describe();
        assert_eq!(d.category, ToolCategory::Shell);
        assert!(d.dangerous);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_echo() {
        let tool = ShellTool::new(vec!["echo".into()]);
        let result = tool
            .execute(serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let tool = ShellTool::new(vec!["ls".into()]).with_workdir(Some(dir.path().to_path_buf()));

        let result = tool.execute(serde_json::json!({"command": "ls"})).await.unwrap();
        assert!(result.output.contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_unsuccessful() {
        let tool = ShellTool::new(vec![]);
        let result = tool
            .execute(serde_json::json!({"command": "exit 3"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.starts_with("[exit code: 3]"));
        assert_eq!(result.data.unwrap()["exit_code"], 3);
    }

    #[tokio::test]
    async fn blocked_command() {
        let tool = ShellTool::new(vec!["ls".into()]);
        let result = tool.execute(serde_json::json!({"command": "rm -rf /"})).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
