//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the assistant the ability to act in the world:
//! read files, run shell commands, fetch URLs, and so on. Anything callable
//! is adapted behind this one trait at registration time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::ToolDescriptor;
use crate::error::ToolError;

/// What a tool produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool considers the call successful
    pub success: bool,

    /// Text fed back to the model as the observation
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core Tool trait.
///
/// A tool declares its name, a free-text description and a JSON Schema for
/// its parameters. The default [`Tool::describe`] infers the rest of the
/// metadata from those; override it to pin timeouts, fallbacks or
/// dependencies.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Full metadata used for selection, planning and execution.
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::infer(self.name(), self.description(), self.parameters_schema())
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

/// A registered tool together with its descriptor.
#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Arc<dyn Tool>,
    pub descriptor: ToolDescriptor,
}

/// The set of tools available to the orchestrator.
///
/// Constructed once at startup and handed to whoever needs it; names are
/// kept sorted so catalogs and summaries are stable.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> ToolDescriptor {
        let descriptor = tool.describe();
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                tool,
                descriptor: descriptor.clone(),
            },
        );
        descriptor
    }

    /// Register a tool under an already-built descriptor.
    pub fn register_described(&mut self, tool: Arc<dyn Tool>, descriptor: ToolDescriptor) {
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool { tool, descriptor },
        );
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| &t.descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values().map(|t| &t.descriptor)
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ToolCategory;
    use std::time::Duration;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolOutput::ok(text))
        }
    }

    struct PinnedTool;

    #[async_trait]
    impl Tool for PinnedTool {
        fn name(&self) -> &str {
            "web_fetch"
        }
        fn description(&self) -> &str {
            "Fetch a URL"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::infer(self.name(), self.description(), self.parameters_schema())
                .with_timeout(Duration::from_secs(10))
                .with_fallbacks(["cached_fetch"])
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::ok(""))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        let descriptor = registry.register(Arc::new(EchoTool));
        assert_eq!(descriptor.name, "echo");
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_uses_tool_overrides() {
        let registry = ToolRegistry::new().with(Arc::new(PinnedTool)).with(Arc::new(EchoTool));
        let d = registry.descriptor("web_fetch").unwrap();
        assert_eq!(d.category, ToolCategory::Network);
        assert_eq!(d.timeout, Duration::from_secs(10));
        assert_eq!(d.fallbacks, vec!["cached_fetch"]);
        assert_eq!(registry.names(), vec!["echo", "web_fetch"]);
    }

    #[tokio::test]
    async fn registered_tool_executes() {
        let registry = ToolRegistry::new().with(Arc::new(EchoTool));
        let entry = registry.get("echo").unwrap();
        let out = entry
            .tool
            .execute(serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.output, "hello world");
    }
}
