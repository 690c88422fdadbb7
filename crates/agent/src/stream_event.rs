//! Per-turn streaming events.
//!
//! `TurnEvent` is the only externally observable contract of the control
//! loop. Every turn ends with exactly one terminal event.
//!
//! - `thinking`: classifier result or a model thought
//! - `tool_call`: a tool is about to run
//! - `tool_result`: a tool finished (or was served from cache)
//! - `progress`: emitted after every observation
//! - `text`: the final answer
//! - `complete`: terminal, answered or aborted
//! - `error`: terminal, failed

use serde::{Deserialize, Serialize};
use steward_core::intent::Intent;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Answered,
    Failed,
    Aborted,
}

impl TerminalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalState::Answered => "answered",
            TerminalState::Failed => "failed",
            TerminalState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Thinking { content: String },

    ToolCall {
        step: usize,
        tool: String,
        arguments: serde_json::Value,
    },

    ToolResult {
        step: usize,
        tool: String,
        success: bool,
        output: String,
        cached: bool,
        duration_ms: u64,
    },

    Text { content: String },

    Progress {
        iteration: u32,
        max_iterations: u32,
        tool_calls: usize,
    },

    Complete {
        state: TerminalState,
        iterations: u32,
        duration_ms: u64,
        used_tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<Box<Intent>>,
        /// Set when the answer is a best-effort summary
        partial: bool,
        compacted: bool,
    },

    Error { message: String },
}

impl TurnEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Text { .. } => "text",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}
