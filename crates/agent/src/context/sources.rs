//! Producing the tagged contributions for one turn.
//!
//! The builder gathers everything that may go in front of the model and tags
//! it with a source and tier. It does not enforce the budget; that is the
//! assembler's job. Retrieval and preference lookups are best-effort: a
//! failing collaborator costs its contribution, never the turn.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use steward_config::ContextConfig;
use steward_core::cache::ToolResultCache;
use steward_core::collaborator::{KnowledgeRetriever, PreferenceSource};
use steward_core::intent::{Capability, Intent};
use steward_core::session::Turn;
use tracing::{debug, warn};

use super::assembler::{ContextContribution, ContextSource, Priority};
use super::token::TokenEstimator;

const CACHE_SUMMARY_LIMIT: usize = 5;
const CACHE_EXCERPT_CHARS: usize = 200;

/// A file the user pointed at, already read by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,
    pub content: String,
}

impl FileReference {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything the builder needs to know about the current turn.
pub struct ContextInputs<'a> {
    pub message: &'a str,
    pub intent: &'a Intent,
    /// Session turns that precede the current message
    pub history: &'a [Turn],
    pub file_refs: &'a [FileReference],
    pub skills: &'a [String],
    pub extra: &'a [String],
    /// Grouped catalog text from the orchestrator
    pub tool_catalog: &'a str,
    /// One line per recommended tool with its rationale
    pub recommended_tools: &'a [String],
    pub cache: &'a ToolResultCache,
    pub run_id: &'a str,
    pub user_id: Option<&'a str>,
}

pub struct ContextBuilder {
    config: ContextConfig,
    estimator: TokenEstimator,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    preferences: Option<Arc<dyn PreferenceSource>>,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        let estimator = TokenEstimator::new(config.chars_per_token);
        Self {
            config,
            estimator,
            retriever: None,
            preferences: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceSource>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Build the contributions for one turn, in the order the assembler should
    /// consider them within each tier.
    pub async fn build(&self, inputs: &ContextInputs<'_>) -> Vec<ContextContribution> {
        let mut out = Vec::new();

        // CRITICAL
        out.push(
            ContextContribution::new(
                ContextSource::SystemInstructions,
                Priority::Critical,
                self.config.system_prompt.clone(),
            )
            .with_label("system-prompt"),
        );

        // HIGH
        for file in inputs.file_refs {
            out.push(
                ContextContribution::new(
                    ContextSource::FileReference,
                    Priority::High,
                    format!("### {}\n```\n{}\n```", file.path, file.content),
                )
                .with_label(file.path.clone())
                .with_citation(file.path.clone()),
            );
        }

        for (i, skill) in inputs.skills.iter().enumerate() {
            out.push(
                ContextContribution::new(ContextSource::SkillInstructions, Priority::High, skill.clone())
                    .with_label(format!("skill-{}", i + 1)),
            );
        }

        if !inputs.tool_catalog.is_empty() {
            let mut text = inputs.tool_catalog.to_string();
            if !inputs.recommended_tools.is_empty() {
                text.push_str("\n\nRecommended for this request:\n");
                text.push_str(&inputs.recommended_tools.join("\n"));
            }
            out.push(
                ContextContribution::new(ContextSource::ToolCatalog, Priority::High, text)
                    .with_label("catalog"),
            );
        }

        if inputs.intent.needs(Capability::KnowledgeRetrieval) {
            out.extend(self.retrieve(inputs.message).await);
        }

        // MEDIUM
        if let Some(history) = self.history_text(inputs.history) {
            out.push(
                ContextContribution::new(ContextSource::ConversationHistory, Priority::Medium, history)
                    .with_label("history"),
            );
        }

        let prior = inputs
            .cache
            .summary(Some(inputs.run_id), CACHE_SUMMARY_LIMIT, CACHE_EXCERPT_CHARS);
        if !prior.is_empty() {
            out.push(
                ContextContribution::new(ContextSource::PriorToolResults, Priority::Medium, prior)
                    .with_label("tool-cache"),
            );
        }

        out.push(
            ContextContribution::new(
                ContextSource::Custom,
                Priority::Medium,
                analysis_note(inputs.intent),
            )
            .with_label("request-analysis"),
        );

        for (i, extra) in inputs.extra.iter().enumerate() {
            out.push(
                ContextContribution::new(ContextSource::Custom, Priority::Medium, extra.clone())
                    .with_label(format!("extra-{}", i + 1)),
            );
        }

        // LOW
        if let (Some(prefs), Some(user_id)) = (&self.preferences, inputs.user_id) {
            if let Some(style) = prefs.style_prompt(user_id).await {
                if !style.trim().is_empty() {
                    out.push(
                        ContextContribution::new(ContextSource::UserPreference, Priority::Low, style)
                            .with_label(user_id.to_string()),
                    );
                }
            }
        }

        debug!(contributions = out.len(), "Context contributions built");
        out
    }

    async fn retrieve(&self, query: &str) -> Vec<ContextContribution> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        match retriever.retrieve(query, self.config.retrieval_top_k).await {
            Ok(chunks) => chunks
                .into_iter()
                .map(|chunk| {
                    ContextContribution::new(
                        ContextSource::RetrievedKnowledge,
                        Priority::High,
                        format!("[{}] {}", chunk.source, chunk.content),
                    )
                    .with_label(chunk.source.clone())
                    .with_citation(chunk.source)
                })
                .collect(),
            Err(e) => {
                warn!(retriever = retriever.name(), error = %e, "Knowledge retrieval failed, continuing without it");
                Vec::new()
            }
        }
    }

    /// Most recent turns rendered as `role: content`, newest kept when the
    /// history token limit is reached.
    fn history_text(&self, history: &[Turn]) -> Option<String> {
        let start = history.len().saturating_sub(self.config.history_turns);
        let mut kept: Vec<String> = Vec::new();
        let mut used = 0;
        for turn in history[start..].iter().rev() {
            let line = format!("{}: {}", turn.role.as_str(), turn.content);
            let cost = self.estimator.estimate(&line);
            if used + cost > self.config.history_token_limit {
                break;
            }
            used += cost;
            kept.push(line);
        }
        if kept.is_empty() {
            return None;
        }
        kept.reverse();
        Some(kept.join("\n"))
    }
}

fn analysis_note(intent: &Intent) -> String {
    let mut note = format!("Request analysis: {}", intent.summary());
    if !intent.deep.is_empty() {
        note.push_str(&format!("\nUnderlying goal: {}", intent.deep));
    }
    if intent.references_history {
        note.push_str("\nThe request refers to earlier conversation.");
    }
    note
}
