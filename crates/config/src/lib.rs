//! Configuration loading, validation, and management for Steward.
//!
//! Loads configuration from `~/.steward/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.steward/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model service connection
    #[serde(default)]
    pub model: ModelConfig,

    /// Intent classifier
    #[serde(default)]
    pub intent: IntentConfig,

    /// Context assembly budget and sources
    #[serde(default)]
    pub context: ContextConfig,

    /// Tool orchestration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Control loop and engine
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session compaction
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Session persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Knowledge base for retrieval
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Per-user style prompts, keyed by user id
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub preferences: HashMap<String, String>,
}

// ── Model ───────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_request_timeout() -> u64 {
    120
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ── Intent ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Ask the model when the deterministic tier has no match
    #[serde(default = "default_true")]
    pub use_model: bool,

    #[serde(default = "default_intent_temperature")]
    pub temperature: f32,

    /// Messages longer than this skip the deterministic tier
    #[serde(default = "default_quick_match_max_chars")]
    pub quick_match_max_chars: usize,

    /// Recent turns shown to the model tier
    #[serde(default = "default_intent_history")]
    pub history_turns: usize,
}

fn default_true() -> bool {
    true
}
fn default_intent_temperature() -> f32 {
    0.1
}
fn default_quick_match_max_chars() -> usize {
    200
}
fn default_intent_history() -> usize {
    3
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            use_model: true,
            temperature: default_intent_temperature(),
            quick_match_max_chars: default_quick_match_max_chars(),
            history_turns: default_intent_history(),
        }
    }
}

// ── Context ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total context budget in estimated tokens
    #[serde(default = "default_budget_tokens")]
    pub budget_tokens: usize,

    /// Held back for the model's reply
    #[serde(default = "default_reserve_tokens")]
    pub reserve_tokens: usize,

    /// Divisor for the character-count token estimate
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Prior turns offered as conversation history
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// History is trimmed oldest-first to fit this many tokens
    #[serde(default = "default_history_token_limit")]
    pub history_token_limit: usize,

    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// Base instructions placed ahead of everything else
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_budget_tokens() -> usize {
    8000
}
fn default_reserve_tokens() -> usize {
    1024
}
fn default_chars_per_token() -> usize {
    4
}
fn default_history_turns() -> usize {
    10
}
fn default_history_token_limit() -> usize {
    2000
}
fn default_retrieval_top_k() -> usize {
    5
}
fn default_system_prompt() -> String {
    "You are Steward, a careful assistant that uses tools when they help and answers directly when they do not.".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_tokens: default_budget_tokens(),
            reserve_tokens: default_reserve_tokens(),
            chars_per_token: default_chars_per_token(),
            history_turns: default_history_turns(),
            history_token_limit: default_history_token_limit(),
            retrieval_top_k: default_retrieval_top_k(),
            system_prompt: default_system_prompt(),
        }
    }
}

// ── Tools ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tools recommended per request
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,

    /// Worker ceiling for parallel tool groups
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default = "default_tool_timeout")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_retries")]
    pub default_retries: u32,

    /// Refine lexical selection with one model call when over `max_selected`
    #[serde(default = "default_true")]
    pub rerank_with_model: bool,

    /// Commands the shell tool may run
    #[serde(default = "default_shell_allowlist")]
    pub shell_allowlist: Vec<String>,

    /// Restrict file tools to this directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
}

fn default_max_selected() -> usize {
    5
}
fn default_max_parallel() -> usize {
    4
}
fn default_tool_timeout() -> u64 {
    60
}
fn default_retries() -> u32 {
    1
}
fn default_shell_allowlist() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "whoami", "wc", "grep", "find",
        "which", "uname", "ps", "env", "git",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_selected: default_max_selected(),
            max_parallel: default_max_parallel(),
            default_timeout_secs: default_tool_timeout(),
            default_retries: default_retries(),
            rerank_with_model: true,
            shell_allowlist: default_shell_allowlist(),
            workspace_root: None,
        }
    }
}

// ── Agent ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on model calls per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Floor for the intent-sized iteration budget
    #[serde(default = "default_min_iterations")]
    pub min_iterations: u32,

    #[serde(default = "default_agent_temperature")]
    pub temperature: f32,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    /// Capacity of the per-turn event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Reject a second request for a busy session instead of queueing it
    #[serde(default)]
    pub reject_busy_sessions: bool,

    /// Sessions processed at once by batch chat
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

fn default_max_iterations() -> u32 {
    12
}
fn default_min_iterations() -> u32 {
    4
}
fn default_agent_temperature() -> f32 {
    0.3
}
fn default_model_timeout() -> u64 {
    120
}
fn default_event_buffer() -> usize {
    128
}
fn default_batch_concurrency() -> usize {
    4
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            min_iterations: default_min_iterations(),
            temperature: default_agent_temperature(),
            model_timeout_secs: default_model_timeout(),
            event_buffer: default_event_buffer(),
            reject_busy_sessions: false,
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

// ── Compaction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compact automatically after each turn when over threshold
    #[serde(default = "default_true")]
    pub auto_compact: bool,

    #[serde(default = "default_threshold_tokens")]
    pub threshold_tokens: usize,

    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,

    /// Most recent turns kept verbatim
    #[serde(default = "default_preserve_recent")]
    pub preserve_recent: usize,

    #[serde(default = "default_true")]
    pub prune_tool_outputs: bool,

    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,

    /// Use the model for summaries; the extractive summary is the fallback
    #[serde(default = "default_true")]
    pub summarize_with_model: bool,

    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
}

fn default_threshold_tokens() -> usize {
    6000
}
fn default_target_tokens() -> usize {
    3000
}
fn default_preserve_recent() -> usize {
    4
}
fn default_max_tool_output_chars() -> usize {
    500
}
fn default_max_summary_chars() -> usize {
    1000
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            auto_compact: true,
            threshold_tokens: default_threshold_tokens(),
            target_tokens: default_target_tokens(),
            preserve_recent: default_preserve_recent(),
            prune_tool_outputs: true,
            max_tool_output_chars: default_max_tool_output_chars(),
            summarize_with_model: true,
            max_summary_chars: default_max_summary_chars(),
        }
    }
}

// ── Store / knowledge ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Directory for the file store; defaults to `~/.steward/sessions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory of text documents indexed at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

// ── Loading ─────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from `STEWARD_CONFIG` or the default path
    /// (~/.steward/config.toml), then apply environment overrides:
    /// - `STEWARD_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `STEWARD_MODEL`
    /// - `STEWARD_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("STEWARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(key) = env("STEWARD_API_KEY").or_else(|| {
            if self.model.api_key.is_none() {
                env("OPENAI_API_KEY")
            } else {
                None
            }
        }) {
            self.model.api_key = Some(key);
        }
        if let Some(model) = env("STEWARD_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = env("STEWARD_BASE_URL") {
            self.model.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".steward")
    }

    /// Directory used by the file session store when none is configured.
    pub fn sessions_dir(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("sessions"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("model.temperature", self.model.temperature),
            ("intent.temperature", self.intent.temperature),
            ("agent.temperature", self.agent.temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.context.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "context.chars_per_token must be > 0".into(),
            ));
        }

        if self.context.reserve_tokens >= self.context.budget_tokens {
            return Err(ConfigError::ValidationError(
                "context.reserve_tokens must be smaller than context.budget_tokens".into(),
            ));
        }

        if self.agent.max_iterations == 0 || self.agent.min_iterations > self.agent.max_iterations
        {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0 and >= agent.min_iterations".into(),
            ));
        }

        if self.tools.max_parallel == 0 || self.agent.batch_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_parallel and agent.batch_concurrency must be > 0".into(),
            ));
        }

        if self.compaction.target_tokens > self.compaction.threshold_tokens {
            return Err(ConfigError::ValidationError(
                "compaction.target_tokens must not exceed compaction.threshold_tokens".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.context.budget_tokens, 8000);
        assert_eq!(config.compaction.threshold_tokens, 6000);
        assert_eq!(config.compaction.preserve_recent, 4);
        assert_eq!(config.tools.default_timeout_secs, 60);
        assert_eq!(config.agent.event_buffer, 128);
        assert_eq!(config.store.kind, StoreKind::Memory);
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.preferences.insert("alice".into(), "Answer tersely.".into());
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.agent.max_iterations, config.agent.max_iterations);
        assert_eq!(parsed.preferences["alice"], "Answer tersely.");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [agent]
            max_iterations = 20

            [store]
            kind = "file"
            path = "/var/lib/steward"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.agent.max_iterations, 20);
        assert_eq!(parsed.agent.min_iterations, 4);
        assert_eq!(parsed.store.kind, StoreKind::File);
        assert_eq!(parsed.sessions_dir(), PathBuf::from("/var/lib/steward"));
        assert!(parsed.intent.use_model);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reserve_must_fit_inside_budget() {
        let mut config = AppConfig::default();
        config.context.reserve_tokens = config.context.budget_tokens;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reserve_tokens"));
    }

    #[test]
    fn iteration_bounds_validated() {
        let mut config = AppConfig::default();
        config.agent.min_iterations = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model.model, "gpt-4o-mini");
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nmax_iterations = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[context]\nchars_per_token = 0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "OPENAI_API_KEY" => Some("sk-openai".into()),
            "STEWARD_MODEL" => Some("llama3".into()),
            "STEWARD_BASE_URL" => Some("http://localhost:11434/v1".into()),
            _ => None,
        });
        assert_eq!(config.model.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.model.model, "llama3");
        assert_eq!(config.model.base_url, "http://localhost:11434/v1");

        config.apply_overrides(|key| match key {
            "STEWARD_API_KEY" => Some("sk-steward".into()),
            "OPENAI_API_KEY" => Some("sk-openai-2".into()),
            _ => None,
        });
        assert_eq!(config.model.api_key.as_deref(), Some("sk-steward"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("threshold_tokens"));
    }
}
