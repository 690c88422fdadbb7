//! Session and Turn domain types.
//!
//! A session is the unit of exclusive ownership: one loop execution at a time
//! mutates it. Its transcript only grows, except when the compactor swaps a
//! prefix for a single summary turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::ToolResultCache;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Output of a tool invocation fed back to the model
    ToolObservation,
    /// Instructions and synthetic summaries
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::ToolObservation => "tool-observation",
            Role::System => "system",
        }
    }
}

/// What kind of synthetic turn this is, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    CompactionSummary,
    ParseCorrection,
}

/// Structured metadata attached to a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TurnKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    /// Set when the content was truncated; holds the pre-truncation length in chars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_length: Option<usize>,

    /// Number of turns folded into this one (summary turns only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarized_turns: Option<usize>,
}

impl TurnMetadata {
    pub fn is_empty(&self) -> bool {
        *self == TurnMetadata::default()
    }

    pub fn truncated(&self) -> bool {
        self.original_length.is_some()
    }
}

/// A single entry in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "TurnMetadata::is_empty")]
    pub metadata: TurnMetadata,
}

impl Turn {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            metadata: TurnMetadata::default(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// An observation produced by running (or replaying) a tool call.
    pub fn observation(
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        success: bool,
        content: impl Into<String>,
    ) -> Self {
        let mut turn = Self::with_role(Role::ToolObservation, content);
        turn.metadata.tool_name = Some(tool_name.into());
        turn.metadata.arguments = Some(arguments);
        turn.metadata.success = Some(success);
        turn
    }

    pub fn with_metadata(mut self, metadata: TurnMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_summary(&self) -> bool {
        self.metadata.kind == Some(TurnKind::CompactionSummary)
    }
}

/// Cumulative token counters reported by the model service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub model_calls: u64,
    pub tool_calls: u64,
}

impl UsageCounters {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A conversation between one user and the assistant, plus everything the
/// control loop remembers about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    transcript: Vec<Turn>,

    #[serde(default)]
    pub tool_cache: ToolResultCache,

    #[serde(default)]
    pub usage: UsageCounters,

    /// Number of compactions applied so far.
    #[serde(default)]
    pub compaction_watermark: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            transcript: Vec::new(),
            tool_cache: ToolResultCache::default(),
            usage: UsageCounters::default(),
            compaction_watermark: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    /// Append a turn. The only way a transcript grows.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.transcript.push(turn);
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.transcript.len().saturating_sub(n);
        &self.transcript[start..]
    }

    /// Replace the transcript with a compacted one and advance the watermark.
    pub fn apply_compaction(&mut self, transcript: Vec<Turn>) {
        self.transcript = transcript;
        self.compaction_watermark += 1;
        self.updated_at = Utc::now();
    }
}
