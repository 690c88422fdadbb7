//! Record of tool invocations made within a session.
//!
//! Entries are keyed by a call signature (tool name plus canonicalized
//! arguments) scoped to the loop run that produced them. Within one run a
//! signature appears at most once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_CAPACITY: usize = 128;

/// One recorded tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToolCall {
    pub run_id: String,
    pub tool: String,
    pub signature: String,
    pub arguments: Value,
    pub output: String,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultCache {
    entries: Vec<CachedToolCall>,
    #[serde(default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for ToolResultCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ToolResultCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Canonical signature for a call: object keys sorted at every depth.
    pub fn signature(tool: &str, arguments: &Value) -> String {
        format!("{tool}:{}", canonicalize(arguments))
    }

    /// A prior call with this signature in the given run. Failed calls are
    /// returned as well, so one run never repeats an identical call.
    pub fn lookup(&self, run_id: &str, signature: &str) -> Option<&CachedToolCall> {
        self.run_entries(run_id).find(|e| e.signature == signature)
    }

    /// Record a call, replacing any earlier entry with the same run and signature.
    pub fn record(
        &mut self,
        run_id: &str,
        tool: &str,
        arguments: Value,
        output: impl Into<String>,
        success: bool,
    ) {
        let signature = Self::signature(tool, &arguments);
        self.entries
            .retain(|e| !(e.run_id == run_id && e.signature == signature));
        self.entries.push(CachedToolCall {
            run_id: run_id.to_string(),
            tool: tool.to_string(),
            signature,
            arguments,
            output: output.into(),
            success,
            recorded_at: Utc::now(),
        });
        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(..overflow);
        }
    }

    pub fn entries(&self) -> &[CachedToolCall] {
        &self.entries
    }

    pub fn run_entries<'a, 'b>(&'a self, run_id: &'b str) -> impl Iterator<Item = &'a CachedToolCall> + use<'a, 'b> {
        self.entries.iter().filter(move |e| e.run_id == run_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short digest of the most recent calls from runs other than `exclude_run`.
    pub fn summary(&self, exclude_run: Option<&str>, limit: usize, excerpt_chars: usize) -> String {
        let lines: Vec<String> = self
            .entries
            .iter()
            .rev()
            .filter(|e| Some(e.run_id.as_str()) != exclude_run)
            .take(limit)
            .map(|e| {
                let status = if e.success { "ok" } else { "failed" };
                format!(
                    "- {}({}) [{status}]: {}",
                    e.tool,
                    canonicalize(&e.arguments),
                    excerpt(&e.output, excerpt_chars)
                )
            })
            .collect();
        lines.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

fn canonicalize(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                let mut out = serde_json::Map::new();
                for (k, v) in ordered {
                    out.insert(k.clone(), v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let cut: String = single_line.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
