//! Built-in tools for Steward.
//!
//! File access goes through a shared [`PathGuard`] confined to the
//! configured workspace root, and the shell only runs allowlisted commands.

pub mod calculator;
pub mod current_time;
pub mod file_read;
pub mod file_write;
pub mod list_directory;
pub mod path_guard;
pub mod shell;
pub mod web_fetch;

use std::sync::Arc;
use std::time::Duration;

use steward_config::ToolsConfig;
use steward_core::descriptor::{DEFAULT_RETRIES, DEFAULT_TIMEOUT, ToolDescriptor};
use steward_core::tool::{Tool, ToolRegistry};

pub use path_guard::PathGuard;

/// Register `tool`, replacing descriptor defaults the tool didn't pin with
/// the configured ones.
pub fn register_with_defaults(
    registry: &mut ToolRegistry,
    tool: Arc<dyn Tool>,
    config: &ToolsConfig,
) -> ToolDescriptor {
    let mut descriptor = tool.describe();
    if descriptor.timeout == DEFAULT_TIMEOUT {
        descriptor.timeout = Duration::from_secs(config.default_timeout_secs);
    }
    if descriptor.retries == DEFAULT_RETRIES {
        descriptor.retries = config.default_retries;
    }
    registry.register_described(tool, descriptor.clone());
    descriptor
}

/// Create a registry with every built-in tool.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let guard = Arc::new(PathGuard::new(config.workspace_root.clone()));
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(file_read::FileReadTool::new(guard.clone())),
        Arc::new(file_write::FileWriteTool::new(guard.clone())),
        Arc::new(list_directory::ListDirectoryTool::new(guard.clone())),
        Arc::new(
            shell::ShellTool::new(config.shell_allowlist.clone())
                .with_workdir(guard.root().map(|r| r.to_path_buf())),
        ),
        Arc::new(web_fetch::WebFetchTool::new()),
        Arc::new(current_time::CurrentTimeTool),
        Arc::new(calculator::CalculatorTool),
    ];

    let mut registry = ToolRegistry::new();
    for tool in tools {
        register_with_defaults(&mut registry, tool, config);
    }
    registry
}
