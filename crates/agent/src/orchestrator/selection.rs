//! Lexical tool selection with an optional model rerank.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use steward_core::descriptor::{ToolDescriptor, keyword_tokens};
use steward_core::provider::ProviderRequest;
use steward_core::session::Turn;
use tracing::{debug, warn};

use super::ToolOrchestrator;
use crate::reply;

const SCORE_FOR_FULL_CONFIDENCE: f32 = 5.0;
const RATIONALE_KEYWORDS: usize = 3;

/// A tool picked for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSelection {
    pub tool: String,
    pub confidence: f32,
    pub reason: String,
    /// Arguments, when the caller already knows them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl ToolSelection {
    pub fn new(tool: impl Into<String>, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            confidence,
            reason: reason.into(),
            arguments: None,
        }
    }

    pub fn with_arguments(mut self, arguments: serde_json::Value) -> Self {
        self.arguments = Some(arguments);
        self
    }
}

#[derive(Debug, Deserialize)]
struct RankedTool {
    tool: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

impl ToolOrchestrator {
    /// Best tools for `task`, most confident first, at most `max_tools`.
    pub async fn select_tools(&self, task: &str, max_tools: usize) -> Vec<ToolSelection> {
        if max_tools == 0 {
            return Vec::new();
        }
        let candidates = self.score_tools(task);
        debug!(task_len = task.len(), candidates = candidates.len(), "Lexical tool scoring");

        if candidates.len() > max_tools && self.config.rerank_with_model {
            if let Some(reranked) = self.rerank(task, &candidates, max_tools).await {
                return reranked;
            }
        }

        candidates.into_iter().take(max_tools).collect()
    }

    /// Every tool with a positive lexical score, best first.
    pub(crate) fn score_tools(&self, task: &str) -> Vec<ToolSelection> {
        let words: HashSet<String> = keyword_tokens(task).into_iter().collect();
        let mut scored: Vec<ToolSelection> = self
            .registry
            .descriptors()
            .filter_map(|d| {
                let (score, matched) = lexical_score(d, &words);
                if score == 0 {
                    return None;
                }
                let mut confidence = (score as f32 / SCORE_FOR_FULL_CONFIDENCE).min(1.0);
                if let Some(usage) = self.usage(&d.name).filter(|u| u.calls > 0) {
                    confidence *= 0.8 + 0.2 * usage.success_rate() as f32;
                }
                let shown: Vec<&str> = matched.iter().take(RATIONALE_KEYWORDS).map(|s| s.as_str()).collect();
                Some(ToolSelection::new(
                    d.name.clone(),
                    confidence,
                    format!("matched {}", shown.join(", ")),
                ))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.tool.cmp(&b.tool))
        });
        scored
    }

    async fn rerank(&self, task: &str, candidates: &[ToolSelection], max_tools: usize) -> Option<Vec<ToolSelection>> {
        let provider = self.ranker.as_ref()?;

        let listing: Vec<String> = candidates
            .iter()
            .filter_map(|c| self.registry.descriptor(&c.tool))
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect();
        let prompt = format!(
            "Pick the {max_tools} tools best suited to the task below. Reply with a JSON array \
             of objects {{\"tool\": name, \"reason\": short text, \"confidence\": 0.0-1.0}}, \
             best first, and nothing else.\n\nTools:\n{}\n\nTask: {task}",
            listing.join("\n")
        );
        let request = ProviderRequest::new(self.ranker_model.clone(), vec![Turn::user(prompt)])
            .with_temperature(0.0)
            .with_max_tokens(Some(300));

        let response = match provider.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Tool rerank call failed, keeping lexical order");
                return None;
            }
        };
        let ranked: Vec<RankedTool> = match reply::find_json_array(&response.content)
            .map(serde_json::from_str)
        {
            Some(Ok(ranked)) => ranked,
            _ => {
                warn!("Tool rerank reply was not a JSON array, keeping lexical order");
                return None;
            }
        };

        let mut seen = HashSet::new();
        let selections: Vec<ToolSelection> = ranked
            .into_iter()
            .filter(|r| self.registry.get(&r.tool).is_some() && seen.insert(r.tool.clone()))
            .take(max_tools)
            .map(|r| {
                let lexical = candidates.iter().find(|c| c.tool == r.tool);
                let confidence = r
                    .confidence
                    .map(|c| c.clamp(0.0, 1.0))
                    .or(lexical.map(|c| c.confidence))
                    .unwrap_or(0.5);
                let reason = r
                    .reason
                    .or_else(|| lexical.map(|c| c.reason.clone()))
                    .unwrap_or_else(|| "ranked by model".into());
                ToolSelection::new(r.tool, confidence, reason)
            })
            .collect();

        (!selections.is_empty()).then_some(selections)
    }
}

/// +1 per descriptor keyword and +2 per capability keyword found in `words`.
fn lexical_score(descriptor: &ToolDescriptor, words: &HashSet<String>) -> (u32, Vec<String>) {
    let mut score = 0;
    let mut matched: Vec<String> = Vec::new();
    for keyword in &descriptor.keywords {
        if words.contains(keyword) {
            score += 1;
            matched.push(keyword.clone());
        }
    }
    for capability in &descriptor.capabilities {
        for keyword in capability.keywords() {
            if words.contains(*keyword) {
                score += 2;
                if !matched.iter().any(|m| m == keyword) {
                    matched.push(keyword.to_string());
                }
            }
        }
    }
    (score, matched)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use steward_config::ToolsConfig;
    use steward_core::tool::ToolRegistry;

    use super::*;
    use crate::test_helpers::{EchoTool, FailingProvider, SequentialMockProvider};

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with(Arc::new(EchoTool::named("file_read", "Read a file from disk")))
            .with(Arc::new(EchoTool::named("list_directory", "List the entries of a directory")))
            .with(Arc::new(EchoTool::named("web_fetch", "Fetch a URL over HTTP")))
            .with(Arc::new(EchoTool::named("shell", "Execute a shell command")))
    }

    #[tokio::test]
    async fn lexical_selection_prefers_matching_tools() {
        let orch = ToolOrchestrator::new(registry(), ToolsConfig::default());
        let picks = orch.select_tools("read the file notes.txt", 3).await;
        assert_eq!(picks[0].tool, "file_read");
        assert!(picks[0].confidence > 0.5);
        assert!(picks[0].reason.contains("read"));
        assert!(picks.iter().all(|p| p.tool != "web_fetch"));
    }

    #[tokio::test]
    async fn no_match_selects_nothing() {
        let orch = ToolOrchestrator::new(registry(), ToolsConfig::default());
        assert!(orch.select_tools("tell me a joke", 3).await.is_empty());
        assert!(orch.select_tools("read a file", 0).await.is_empty());
    }

    #[tokio::test]
    async fn confidence_is_capped_at_one() {
        let orch = ToolOrchestrator::new(registry(), ToolsConfig::default());
        let picks = orch
            .select_tools("fetch the url over http and download https content from the web", 1)
            .await;
        assert_eq!(picks[0].tool, "web_fetch");
        assert!((picks[0].confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn failures_soften_but_never_filter() {
        let orch = ToolOrchestrator::new(registry(), ToolsConfig::default());
        let before = orch.score_tools("read the file")[0].confidence;
        orch.record_usage("file_read", false, 3);
        let after = orch.score_tools("read the file");
        assert_eq!(after[0].tool, "file_read");
        assert!(after[0].confidence < before);
        assert!((after[0].confidence - before * 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rerank_reorders_and_ignores_unknown_names() {
        let reply = r#"[{"tool": "ghost", "reason": "x"}, {"tool": "list_directory", "reason": "list first", "confidence": 0.9}]"#;
        let provider = Arc::new(SequentialMockProvider::from_texts(&[reply]));
        let orch = ToolOrchestrator::new(registry(), ToolsConfig::default()).with_ranker(provider.clone(), "m");
        let picks = orch.select_tools("list the directory and read a file", 1).await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].tool, "list_directory");
        assert_eq!(picks[0].reason, "list first");
    }

    #[tokio::test]
    async fn rerank_failure_keeps_lexical_order() {
        let orch = ToolOrchestrator::new(registry(), ToolsConfig::default())
            .with_ranker(Arc::new(FailingProvider), "m");
        let lexical = orch.score_tools("list the directory and read a file");
        let picks = orch.select_tools("list the directory and read a file", 1).await;
        assert_eq!(picks[0].tool, lexical[0].tool);
    }

    #[tokio::test]
    async fn rerank_skipped_when_candidates_fit() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let orch = ToolOrchestrator::new(registry(), ToolsConfig::default()).with_ranker(provider.clone(), "m");
        let picks = orch.select_tools("read the file", 5).await;
        assert!(!picks.is_empty());
        assert_eq!(provider.call_count(), 0);
    }
}
