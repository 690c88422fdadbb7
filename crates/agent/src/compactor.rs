//! Session compaction.
//!
//! Once a transcript grows past the token threshold, everything except the
//! most recent turns is folded into one synthetic system turn. Long tool
//! observations in the folded part are truncated first so the summary
//! prompt stays small. With a summarizer attached the summary is written by
//! the model; otherwise (or when the model call fails) an extractive summary
//! is built from user requests and tool usage.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use steward_config::CompactionConfig;
use steward_core::event::{DomainEvent, EventBus};
use steward_core::provider::{Provider, ProviderRequest};
use steward_core::session::{Role, Session, Turn, TurnKind, TurnMetadata};
use tracing::{debug, info, warn};

use crate::context::token::TokenEstimator;

const SUMMARY_HEADER: &str = "[Session summary]";
const PROMPT_TURN_CHARS: usize = 500;
const PROMPT_TOTAL_CHARS: usize = 5000;
const EXCERPT_REQUESTS: usize = 3;
const EXCERPT_CHARS: usize = 100;

/// What a compaction did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionResult {
    pub original_turns: usize,
    pub compacted_turns: usize,
    pub original_tokens: usize,
    pub compacted_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Turns kept verbatim
    pub preserved: usize,
    /// Observations truncated before summarizing
    pub pruned: usize,
}

impl CompactionResult {
    fn unchanged(turns: usize, tokens: usize) -> Self {
        Self {
            original_turns: turns,
            compacted_turns: turns,
            original_tokens: tokens,
            compacted_tokens: tokens,
            summary: None,
            preserved: turns,
            pruned: 0,
        }
    }

    /// Fraction of estimated tokens removed, 0.0 for an empty transcript.
    pub fn compression_ratio(&self) -> f64 {
        if self.original_tokens == 0 {
            0.0
        } else {
            1.0 - self.compacted_tokens as f64 / self.original_tokens as f64
        }
    }
}

pub struct SessionCompactor {
    config: CompactionConfig,
    estimator: TokenEstimator,
    summarizer: Option<Arc<dyn Provider>>,
    model: String,
    event_bus: Option<Arc<EventBus>>,
}

impl SessionCompactor {
    pub fn new(config: CompactionConfig, estimator: TokenEstimator) -> Self {
        Self {
            config,
            estimator,
            summarizer: None,
            model: String::new(),
            event_bus: None,
        }
    }

    /// Let the model write summaries. Ignored unless `summarize_with_model` is set.
    pub fn with_summarizer(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.summarizer = Some(provider);
        self.model = model.into();
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn should_compact(&self, turns: &[Turn]) -> bool {
        turns.len() >= self.config.preserve_recent + 2
            && self.estimator.estimate_turns(turns) > self.config.threshold_tokens
    }

    /// Compact `turns`. Without `force` this is a no-op below the threshold.
    pub async fn compact(&self, turns: &[Turn], force: bool) -> (Vec<Turn>, CompactionResult) {
        match self.run(turns, force).await {
            Some(done) => done,
            None => (
                turns.to_vec(),
                CompactionResult::unchanged(turns.len(), self.estimator.estimate_turns(turns)),
            ),
        }
    }

    /// Compact the session in place when it is over the threshold.
    pub async fn auto_compact(&self, session: &mut Session) -> Option<CompactionResult> {
        if !self.config.auto_compact {
            return None;
        }
        self.compact_session(session, false).await
    }

    /// Compact the session in place. Returns `None` when nothing changed.
    pub async fn compact_session(&self, session: &mut Session, force: bool) -> Option<CompactionResult> {
        let (turns, result) = self.run(session.transcript(), force).await?;
        session.apply_compaction(turns);
        info!(
            session_id = %session.id,
            original_turns = result.original_turns,
            compacted_turns = result.compacted_turns,
            ratio = %format!("{:.1}%", result.compression_ratio() * 100.0),
            "Session compacted"
        );
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::SessionCompacted {
                session_id: session.id.to_string(),
                original_turns: result.original_turns,
                compacted_turns: result.compacted_turns,
                compression_ratio: result.compression_ratio(),
                timestamp: chrono::Utc::now(),
            });
        }
        Some(result)
    }

    async fn run(&self, turns: &[Turn], force: bool) -> Option<(Vec<Turn>, CompactionResult)> {
        if turns.is_empty() || (!force && !self.should_compact(turns)) {
            return None;
        }

        let original_tokens = self.estimator.estimate_turns(turns);
        let split = turns.len().saturating_sub(self.config.preserve_recent);
        let (prefix, preserved) = turns.split_at(split);
        if prefix.is_empty() {
            debug!(turns = turns.len(), "Nothing older than the preserved turns, skipping compaction");
            return None;
        }

        let (prefix, pruned) = if self.config.prune_tool_outputs {
            self.prune(prefix)
        } else {
            (prefix.to_vec(), 0)
        };

        let summary = self.summarize(&prefix).await;

        let mut compacted: Vec<Turn> = Vec::with_capacity(preserved.len() + 1);
        compacted.push(Turn::system(format!("{SUMMARY_HEADER}\n{summary}")).with_metadata(TurnMetadata {
            kind: Some(TurnKind::CompactionSummary),
            summarized_turns: Some(prefix.len()),
            ..TurnMetadata::default()
        }));
        compacted.extend_from_slice(preserved);

        let compacted_tokens = self.estimator.estimate_turns(&compacted);
        if compacted_tokens > self.config.target_tokens {
            debug!(compacted_tokens, target = self.config.target_tokens, "Compacted transcript still above target");
        }

        let result = CompactionResult {
            original_turns: turns.len(),
            compacted_turns: compacted.len(),
            original_tokens,
            compacted_tokens,
            summary: Some(summary),
            preserved: preserved.len(),
            pruned,
        };
        Some((compacted, result))
    }

    fn prune(&self, turns: &[Turn]) -> (Vec<Turn>, usize) {
        let max = self.config.max_tool_output_chars;
        let mut pruned = 0;
        let out = turns
            .iter()
            .map(|turn| {
                let length = turn.content.chars().count();
                if turn.role != Role::ToolObservation || length <= max || turn.metadata.truncated() {
                    return turn.clone();
                }
                pruned += 1;
                let head: String = turn.content.chars().take(max).collect();
                let mut truncated = turn.clone();
                truncated.content = format!("{head}\n\n... [output truncated, original length: {length} chars]");
                truncated.metadata.original_length = Some(length);
                truncated
            })
            .collect();
        (out, pruned)
    }

    async fn summarize(&self, turns: &[Turn]) -> String {
        if self.config.summarize_with_model {
            if let Some(provider) = &self.summarizer {
                match self.model_summary(provider.as_ref(), turns).await {
                    Ok(summary) if !summary.is_empty() => return summary,
                    Ok(_) => warn!("Summarizer returned nothing, using extractive summary"),
                    Err(e) => warn!(error = %e, "Summarizer failed, using extractive summary"),
                }
            }
        }
        extractive_summary(turns, self.config.max_summary_chars)
    }

    async fn model_summary(
        &self,
        provider: &dyn Provider,
        turns: &[Turn],
    ) -> Result<String, steward_core::error::ProviderError> {
        let mut conversation = turns
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), truncate_chars(&t.content, PROMPT_TURN_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");
        if conversation.chars().count() > PROMPT_TOTAL_CHARS {
            conversation = format!("{}\n...", conversation.chars().take(PROMPT_TOTAL_CHARS).collect::<String>());
        }

        let prompt = format!(
            "Condense the conversation below into a short summary.\n\
             - Keep key facts and decisions\n\
             - Keep file names, paths and code locations\n\
             - Keep the user's main requests and the main answers\n\
             - Use bullet points, at most {} characters\n\n\
             Conversation:\n{conversation}\n\nSummary:",
            self.config.max_summary_chars
        );
        let request = ProviderRequest::new(self.model.clone(), vec![Turn::user(prompt)])
            .with_context("You write concise, information-dense conversation summaries.")
            .with_temperature(0.2);
        let response = provider.complete(request).await?;
        Ok(truncate_chars(response.content.trim(), self.config.max_summary_chars))
    }
}

/// Summary built without a model: any earlier summary, early user requests,
/// tools used and turn counts. The earlier summary is cut to `max_chars`.
pub fn extractive_summary(turns: &[Turn], max_chars: usize) -> String {
    let earlier: Vec<&str> = turns
        .iter()
        .filter(|t| t.is_summary())
        .map(|t| t.content.strip_prefix(SUMMARY_HEADER).unwrap_or(&t.content).trim())
        .filter(|content| !content.is_empty())
        .collect();
    let requests: Vec<&Turn> = turns.iter().filter(|t| t.role == Role::User).collect();
    let replies = turns.iter().filter(|t| t.role == Role::Assistant).count();
    let tools: BTreeSet<&str> = turns
        .iter()
        .filter_map(|t| t.metadata.tool_name.as_deref())
        .collect();

    let mut lines = Vec::new();
    if !earlier.is_empty() {
        lines.push("Earlier summary:".to_string());
        lines.push(truncate_chars(&earlier.join("\n"), max_chars));
    }
    if !requests.is_empty() {
        lines.push("User requests:".to_string());
        for turn in requests.iter().take(EXCERPT_REQUESTS) {
            lines.push(format!("  - {}", truncate_chars(&turn.content, EXCERPT_CHARS)));
        }
        if requests.len() > EXCERPT_REQUESTS {
            lines.push(format!("  - ... and {} more", requests.len() - EXCERPT_REQUESTS));
        }
    }
    if !tools.is_empty() {
        lines.push(format!("Tools used: {}", tools.into_iter().collect::<Vec<_>>().join(", ")));
    }
    lines.push(format!("Turns: {} user, {} assistant", requests.len(), replies));
    lines.join("\n")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, SequentialMockProvider};
    use steward_core::session::SessionId;

    fn config() -> CompactionConfig {
        CompactionConfig {
            threshold_tokens: 500,
            target_tokens: 200,
            summarize_with_model: false,
            ..CompactionConfig::default()
        }
    }

    fn long_transcript(n: usize) -> Vec<Turn> {
        (0..n)
            .map(|i| match i % 4 {
                0 => Turn::user(format!("request {i}: {}", "please look at this ".repeat(5))),
                1 => Turn::observation("file_read", serde_json::json!({"path": format!("/tmp/{i}")}), true, "x".repeat(900)),
                2 => Turn::observation("shell", serde_json::json!({"command": "ls"}), true, "ok"),
                _ => Turn::assistant(format!("answer {i}: {}", "here is what I found ".repeat(5))),
            })
            .collect()
    }

    #[test]
    fn should_compact_needs_turns_and_tokens() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        assert!(!compactor.should_compact(&long_transcript(5)));
        assert!(compactor.should_compact(&long_transcript(40)));
        let small: Vec<Turn> = (0..10).map(|i| Turn::user(format!("hi {i}"))).collect();
        assert!(!compactor.should_compact(&small));
    }

    #[tokio::test]
    async fn forty_turns_compact_to_summary_plus_preserved() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        let turns = long_transcript(40);
        let (compacted, result) = compactor.compact(&turns, false).await;

        assert_eq!(result.compacted_turns, 5);
        assert_eq!(compacted.len(), 5);
        assert!(result.compression_ratio() > 0.0);
        assert!(compacted[0].is_summary());
        assert_eq!(compacted[0].role, Role::System);
        assert!(compacted[0].content.starts_with("[Session summary]\n"));
        assert_eq!(compacted[0].metadata.summarized_turns, Some(36));
        assert_eq!(compacted[1].id, turns[36].id);
        assert_eq!(result.preserved, 4);
        assert_eq!(result.pruned, 9);
    }

    #[tokio::test]
    async fn compaction_is_idempotent() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        let (once, _) = compactor.compact(&long_transcript(40), true).await;
        let (twice, result) = compactor.compact(&once, false).await;
        assert_eq!(
            once.iter().map(|t| &t.id).collect::<Vec<_>>(),
            twice.iter().map(|t| &t.id).collect::<Vec<_>>()
        );
        assert_eq!(result.compression_ratio(), 0.0);
    }

    #[tokio::test]
    async fn below_threshold_without_force_is_noop() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        let turns = vec![Turn::user("hi"), Turn::assistant("hello")];
        let (out, result) = compactor.compact(&turns, false).await;
        assert_eq!(out.len(), 2);
        assert!(result.summary.is_none());
    }

    #[tokio::test]
    async fn force_compacts_small_transcripts() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        let turns: Vec<Turn> = (0..6).map(|i| Turn::user(format!("q{i}"))).collect();
        let (out, result) = compactor.compact(&turns, true).await;
        assert_eq!(out.len(), 5);
        assert_eq!(result.summary.as_deref().map(|s| s.contains("q0")), Some(true));
    }

    #[tokio::test]
    async fn force_with_nothing_to_fold_changes_nothing() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        let mut session = Session::new(SessionId::from("s1"));
        for i in 0..4 {
            session.push(Turn::user(format!("q{i}")));
        }

        assert!(compactor.compact_session(&mut session, true).await.is_none());
        assert_eq!(session.len(), 4);
        assert_eq!(session.compaction_watermark, 0);

        let (out, result) = compactor.compact(session.transcript(), true).await;
        assert_eq!(out.len(), 4);
        assert!(result.summary.is_none());
    }

    #[tokio::test]
    async fn repeated_compaction_keeps_earlier_summary() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        let mut turns: Vec<Turn> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("please edit /src/file{}.rs", i / 2))
                } else {
                    Turn::assistant("done")
                }
            })
            .collect();

        let (once, first) = compactor.compact(&turns, true).await;
        assert!(first.summary.unwrap().contains("/src/file0.rs"));

        turns = once;
        turns.push(Turn::user("please edit /src/file10.rs"));
        let (twice, second) = compactor.compact(&turns, true).await;
        let summary = second.summary.unwrap();

        assert!(summary.starts_with("Earlier summary:\nUser requests:\n  - please edit /src/file0.rs"));
        assert!(summary.contains("/src/file8.rs"));
        assert!(twice[0].is_summary());
        assert_eq!(twice.iter().filter(|t| t.is_summary()).count(), 1);
    }

    #[test]
    fn earlier_summary_is_truncated() {
        let old = Turn::system(format!("{SUMMARY_HEADER}\n{}", "fact ".repeat(100))).with_metadata(TurnMetadata {
            kind: Some(TurnKind::CompactionSummary),
            ..TurnMetadata::default()
        });
        let summary = extractive_summary(&[old, Turn::user("next")], 20);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Earlier summary:");
        assert_eq!(lines[1].chars().count(), 23);
        assert!(!summary.contains(SUMMARY_HEADER));
        assert!(summary.contains("  - next"));
    }

    #[test]
    fn extractive_summary_lists_requests_and_tools() {
        let summary = extractive_summary(&long_transcript(20), 2000);
        assert!(summary.starts_with("User requests:\n  - request 0:"));
        assert!(summary.contains("... and 2 more"));
        assert!(summary.contains("Tools used: file_read, shell"));
        assert!(summary.contains("Turns: 5 user, 5 assistant"));
    }

    #[tokio::test]
    async fn model_summary_is_used_and_truncated() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[&"- fact\n".repeat(400)]));
        let compactor = SessionCompactor::new(
            CompactionConfig {
                summarize_with_model: true,
                max_summary_chars: 50,
                ..config()
            },
            TokenEstimator::default(),
        )
        .with_summarizer(provider.clone(), "m");
        let (out, result) = compactor.compact(&long_transcript(40), false).await;
        assert_eq!(provider.call_count(), 1);
        let summary = result.summary.unwrap();
        assert_eq!(summary.chars().count(), 53);
        assert!(out[0].content.contains("- fact"));

        let prompt = &provider.last_request().unwrap().turns[0].content;
        assert!(prompt.contains("request 0"));
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back() {
        let compactor = SessionCompactor::new(
            CompactionConfig {
                summarize_with_model: true,
                ..config()
            },
            TokenEstimator::default(),
        )
        .with_summarizer(Arc::new(FailingProvider), "m");
        let (_, result) = compactor.compact(&long_transcript(40), false).await;
        assert!(result.summary.unwrap().starts_with("User requests:"));
    }

    #[tokio::test]
    async fn auto_compact_updates_session() {
        let compactor = SessionCompactor::new(config(), TokenEstimator::default());
        let mut session = Session::new(SessionId::from("s1"));
        for turn in long_transcript(40) {
            session.push(turn);
        }
        let result = compactor.auto_compact(&mut session).await.unwrap();
        assert_eq!(session.len(), result.compacted_turns);
        assert_eq!(session.compaction_watermark, 1);
        assert!(compactor.auto_compact(&mut session).await.is_none());
        assert_eq!(session.compaction_watermark, 1);
    }
}
