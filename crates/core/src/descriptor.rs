//! Tool metadata and its inference from free text.
//!
//! Tools only have to provide a name, a description and a parameter schema.
//! Everything else the orchestrator needs (category, capability tags, the
//! dangerous flag, timeouts) is derived here from keyword tables, and can be
//! overridden by the tool with the `with_*` builders.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRIES: u32 = 1;

const MAX_DESCRIPTION_KEYWORDS: usize = 10;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "its", "are", "was", "can",
    "will", "given", "returns", "return", "using", "use", "any", "all", "path", "optional",
];

const DANGEROUS_MARKERS: &[&str] = &["delete", "remove", "execute", "write"];

/// Broad family a tool belongs to. Inference picks the first family whose
/// keywords appear in the name or description, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCategory {
    Filesystem,
    Shell,
    Network,
    CodeExecution,
    Search,
    System,
    Data,
}

impl ToolCategory {
    const ORDERED: [ToolCategory; 6] = [
        ToolCategory::Filesystem,
        ToolCategory::Shell,
        ToolCategory::Network,
        ToolCategory::CodeExecution,
        ToolCategory::Search,
        ToolCategory::System,
    ];

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            ToolCategory::Filesystem => &["file", "read", "write", "directory"],
            ToolCategory::Shell => &["shell", "execute", "command", "bash"],
            ToolCategory::Network => &["http", "url", "web", "fetch"],
            ToolCategory::CodeExecution => &["code", "python", "run", "script"],
            ToolCategory::Search => &["search", "find", "query", "retrieve"],
            ToolCategory::System => &["system", "process", "env", "time"],
            ToolCategory::Data => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Filesystem => "filesystem",
            ToolCategory::Shell => "shell",
            ToolCategory::Network => "network",
            ToolCategory::CodeExecution => "code-execution",
            ToolCategory::Search => "search",
            ToolCategory::System => "system",
            ToolCategory::Data => "data",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained capability tags used by lexical tool selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    FileRead,
    FileWrite,
    FileList,
    Shell,
    Web,
    Search,
    Code,
    Process,
    System,
}

impl ToolCapability {
    pub const ALL: [ToolCapability; 9] = [
        ToolCapability::FileRead,
        ToolCapability::FileWrite,
        ToolCapability::FileList,
        ToolCapability::Shell,
        ToolCapability::Web,
        ToolCapability::Search,
        ToolCapability::Code,
        ToolCapability::Process,
        ToolCapability::System,
    ];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            ToolCapability::FileRead => &["read", "view", "open", "cat"],
            ToolCapability::FileWrite => &["write", "save", "create"],
            ToolCapability::FileList => &["ls", "list", "dir", "directory"],
            ToolCapability::Shell => &["shell", "bash", "terminal", "command"],
            ToolCapability::Web => &["url", "http", "https", "fetch", "download"],
            ToolCapability::Search => &["search", "find", "query"],
            ToolCapability::Code => &["python", "script", "code", "calculate"],
            ToolCapability::Process => &["ps", "process"],
            ToolCapability::System => &["system", "status", "environment", "time"],
        }
    }
}

/// Everything the orchestrator knows about a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    /// First line of the tool's description
    pub description: String,
    pub category: ToolCategory,
    pub capabilities: BTreeSet<ToolCapability>,
    /// Lowercase words from the name and the head of the description
    pub keywords: Vec<String>,
    pub dangerous: bool,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Extra attempts after a plain execution failure
    pub retries: u32,
    /// Tried in order when this tool times out
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Tools whose output this one consumes
    #[serde(default)]
    pub requires: Vec<String>,
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    /// Derive a descriptor from a tool's name, description and parameter schema.
    pub fn infer(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        let name_lower = name.to_lowercase();
        let haystack = format!("{} {}", name_lower, description.to_lowercase());
        let tokens: BTreeSet<String> = keyword_tokens(&haystack).into_iter().collect();

        let category = ToolCategory::ORDERED
            .into_iter()
            .find(|c| c.keywords().iter().any(|k| tokens.contains(*k)))
            .unwrap_or(ToolCategory::Data);

        let capabilities = ToolCapability::ALL
            .into_iter()
            .filter(|c| c.keywords().iter().any(|k| tokens.contains(*k)))
            .collect();

        let mut keywords: Vec<String> = Vec::new();
        let name_parts = keyword_tokens(&name_lower);
        let description_head = keyword_tokens(&description.to_lowercase())
            .into_iter()
            .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
            .take(MAX_DESCRIPTION_KEYWORDS);
        for word in name_parts.into_iter().chain(description_head) {
            if !keywords.contains(&word) {
                keywords.push(word);
            }
        }

        let dangerous = DANGEROUS_MARKERS
            .iter()
            .any(|m| name_lower.contains(m) || tokens.contains(*m));

        Self {
            name: name.to_string(),
            description: description.lines().next().unwrap_or("").trim().to_string(),
            category,
            capabilities,
            keywords,
            dangerous,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            fallbacks: Vec::new(),
            requires: Vec::new(),
            parameters,
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_fallbacks<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallbacks = fallbacks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = requires.into_iter().map(Into::into).collect();
        self
    }

    pub fn dangerous(mut self, dangerous: bool) -> Self {
        self.dangerous = dangerous;
        self
    }
}

/// Lowercase alphanumeric words of `text`, in order.
pub fn keyword_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_filesystem_read_tool() {
        let d = ToolDescriptor::infer(
            "file_read",
            "Read the contents of a file from disk.\nLarge files are truncated.",
            json!({"type": "object"}),
        );
        assert_eq!(d.category, ToolCategory::Filesystem);
        assert!(d.capabilities.contains(&ToolCapability::FileRead));
        assert!(!d.dangerous);
        assert_eq!(d.description, "Read the contents of a file from disk.");
        assert_eq!(d.keywords[..2], ["file".to_string(), "read".to_string()]);
        assert_eq!(d.timeout, DEFAULT_TIMEOUT);
        assert_eq!(d.retries, DEFAULT_RETRIES);
    }

    #[test]
    fn write_and_delete_tools_are_dangerous() {
        assert!(ToolDescriptor::infer("file_write", "Write text to a file", json!({})).dangerous);
        assert!(ToolDescriptor::infer("delete_branch", "Delete a git branch", json!({})).dangerous);
        assert!(!ToolDescriptor::infer("calculator", "Evaluate arithmetic", json!({})).dangerous);
    }

    #[test]
    fn category_order_prefers_earlier_families() {
        // "command" would be shell, but "file" comes first.
        let d = ToolDescriptor::infer("file_command", "Run a command on a file", json!({}));
        assert_eq!(d.category, ToolCategory::Filesystem);

        let d = ToolDescriptor::infer("web_fetch", "Fetch a URL over HTTP", json!({}));
        assert_eq!(d.category, ToolCategory::Network);
        assert!(d.capabilities.contains(&ToolCapability::Web));

        let d = ToolDescriptor::infer("shell", "Execute a shell command", json!({}));
        assert_eq!(d.category, ToolCategory::Shell);
        assert!(d.dangerous);
    }

    #[test]
    fn unknown_tools_fall_back_to_data() {
        let d = ToolDescriptor::infer("calculator", "Evaluate arithmetic expressions", json!({}));
        assert_eq!(d.category, ToolCategory::Data);
    }

    #[test]
    fn short_words_do_not_match_inside_longer_ones() {
        // "tools" must not trigger the "ls" capability keyword.
        let d = ToolDescriptor::infer("lister", "Summarises tools", json!({}));
        assert!(!d.capabilities.contains(&ToolCapability::FileList));
    }

    #[test]
    fn builders_override_inferred_values() {
        let d = ToolDescriptor::infer("web_fetch", "Fetch a URL", json!({}))
            .with_timeout(Duration::from_secs(5))
            .with_fallbacks(["cached_fetch"])
            .with_requires(["list_directory"])
            .with_retries(0);
        assert_eq!(d.timeout, Duration::from_secs(5));
        assert_eq!(d.fallbacks, vec!["cached_fetch"]);
        assert_eq!(d.requires, vec!["list_directory"]);
        assert_eq!(d.retries, 0);
    }

    #[test]
    fn descriptor_serializes_timeout_as_seconds() {
        let d = ToolDescriptor::infer("shell", "Execute a shell command", json!({}))
            .with_timeout(Duration::from_millis(1500));
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["timeout"], json!(1.5));
        assert_eq!(value["category"], json!("shell"));
        let back: ToolDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(1500));
    }
}
