//! Two-tier intent classification.
//!
//! 1. **Quick tier**: deterministic patterns for short, greeting-like and
//!    obviously tool-shaped messages. Answers immediately with high confidence.
//! 2. **Model tier**: one low-temperature call with a constrained JSON
//!    schema. Parse or call failures fall back to the keyword heuristic.
//!
//! Entities are extracted lexically and merged into whatever tier answered.
//! Classification never fails: the worst case is a low-confidence
//! conversation intent.

pub mod entities;
pub mod rules;

use std::sync::Arc;

use serde::Deserialize;
use steward_config::IntentConfig;
use steward_core::error::ProviderError;
use steward_core::intent::{
    Capability, Complexity, Intent, IntentSource, OutputFormat, TaskType, surface_of,
};
use steward_core::provider::{Provider, ProviderRequest};
use steward_core::session::Turn;
use tracing::{debug, warn};

use crate::reply;

const MODEL_CONFIDENCE: f32 = 0.85;
const HISTORY_EXCERPT_CHARS: usize = 100;

/// Why the model tier did not produce an intent.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("classification call failed: {0}")]
    Model(#[from] ProviderError),

    #[error("unparsable classification reply: {0}")]
    Parse(String),
}

/// Shape the model is asked to return.
#[derive(Debug, Deserialize)]
struct ModelIntent {
    #[serde(default)]
    surface_intent: Option<String>,
    #[serde(default)]
    deep_intent: Option<String>,
    task_type: TaskType,
    #[serde(default)]
    capabilities: Vec<serde_json::Value>,
    #[serde(default)]
    suggested_tools: Vec<String>,
    #[serde(default = "default_complexity")]
    complexity: Complexity,
    #[serde(default)]
    multi_step: bool,
    #[serde(default)]
    estimated_steps: Option<u32>,
    #[serde(default)]
    references_history: bool,
    #[serde(default)]
    output_format: Option<OutputFormat>,
}

fn default_complexity() -> Complexity {
    Complexity::Low
}

pub struct IntentClassifier {
    config: IntentConfig,
    provider: Option<Arc<dyn Provider>>,
    model: String,
}

impl IntentClassifier {
    pub fn new(config: IntentConfig) -> Self {
        Self {
            config,
            provider: None,
            model: String::new(),
        }
    }

    /// Enable the model tier.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.model = model.into();
        self
    }

    /// Classify `message` given recent history and the names of available tools.
    pub async fn classify(&self, message: &str, history: &[Turn], available_tools: &[String]) -> Intent {
        let mut intent = self.classify_tiers(message, history, available_tools).await;

        intent.entities = entities::extract(message);
        if !intent.entities.urls.is_empty() {
            intent.require(Capability::ExternalFetch);
            push_unique(&mut intent.suggested_tools, "web_fetch");
        }
        if !intent.entities.file_paths.is_empty() || !intent.entities.at_references.is_empty() {
            intent.require(Capability::ToolUse);
            push_unique(&mut intent.suggested_tools, "file_read");
        }
        if !intent.suggested_tools.is_empty() {
            intent.require(Capability::ToolUse);
        }
        if !available_tools.is_empty() {
            intent.suggested_tools.retain(|t| available_tools.contains(t));
        }
        if intent.surface.is_empty() {
            intent.surface = surface_of(message);
        }

        debug!(
            task_type = intent.task_type.as_str(),
            confidence = intent.confidence,
            source = ?intent.source,
            "Intent classified"
        );
        intent
    }

    async fn classify_tiers(&self, message: &str, history: &[Turn], available_tools: &[String]) -> Intent {
        if message.trim().is_empty() {
            return Intent::conversation_default(message);
        }

        if message.chars().count() <= self.config.quick_match_max_chars {
            if let Some(intent) = rules::quick_match(message) {
                return intent;
            }
        }

        if self.config.use_model {
            if let Some(provider) = &self.provider {
                match self.classify_with_model(provider.as_ref(), message, history, available_tools).await {
                    Ok(intent) => return intent,
                    Err(e) => warn!(error = %e, "Model classification failed, using heuristic"),
                }
            }
        }

        rules::heuristic(message)
    }

    async fn classify_with_model(
        &self,
        provider: &dyn Provider,
        message: &str,
        history: &[Turn],
        available_tools: &[String],
    ) -> Result<Intent, IntentError> {
        let prompt = self.build_prompt(message, history, available_tools);
        let request = ProviderRequest::new(self.model.clone(), vec![Turn::user(prompt)])
            .with_temperature(self.config.temperature)
            .with_max_tokens(Some(400));
        let response = provider.complete(request).await?;
        parse_model_reply(message, &response.content)
    }

    fn build_prompt(&self, message: &str, history: &[Turn], available_tools: &[String]) -> String {
        let start = history.len().saturating_sub(self.config.history_turns);
        let history_lines: Vec<String> = history[start..]
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), excerpt(&t.content, HISTORY_EXCERPT_CHARS)))
            .collect();
        let history_block = if history_lines.is_empty() {
            "(none)".to_string()
        } else {
            history_lines.join("\n")
        };
        let tools = if available_tools.is_empty() {
            "(none)".to_string()
        } else {
            available_tools.join(", ")
        };

        format!(
            "Classify the user's message. Reply with a single JSON object and nothing else.\n\n\
             Schema:\n\
             {{\"surface_intent\": string, \"deep_intent\": string,\n \
             \"task_type\": \"query\"|\"action\"|\"analysis\"|\"creation\"|\"modification\"|\"conversation\"|\"complex\",\n \
             \"capabilities\": [\"knowledge_retrieval\"|\"tool_use\"|\"planning\"|\"long_term_memory\"|\"skill_instructions\"|\"external_fetch\"|\"code_execution\"],\n \
             \"suggested_tools\": [string], \"complexity\": \"low\"|\"medium\"|\"high\",\n \
             \"multi_step\": bool, \"estimated_steps\": int, \"references_history\": bool,\n \
             \"output_format\": \"text\"|\"code\"|\"table\"|\"list\"|\"json\"}}\n\n\
             Available tools: {tools}\n\n\
             Recent conversation:\n{history_block}\n\n\
             Message: {message}"
        )
    }
}

fn parse_model_reply(message: &str, reply: &str) -> Result<Intent, IntentError> {
    let json = reply::find_json_object(reply)
        .ok_or_else(|| IntentError::Parse("no JSON object in reply".into()))?;
    let parsed: ModelIntent =
        serde_json::from_str(json).map_err(|e| IntentError::Parse(e.to_string()))?;

    // Unknown capability names are ignored rather than failing the parse.
    let capabilities: Vec<Capability> = parsed
        .capabilities
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .fold(Vec::new(), |mut acc, c| {
            if !acc.contains(&c) {
                acc.push(c);
            }
            acc
        });

    let estimated_steps = parsed.estimated_steps.unwrap_or(match parsed.complexity {
        Complexity::Low => 1,
        Complexity::Medium => 2,
        Complexity::High => 3,
    });

    Ok(Intent {
        surface: parsed
            .surface_intent
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| surface_of(message)),
        deep: parsed.deep_intent.unwrap_or_default(),
        task_type: parsed.task_type,
        capabilities,
        suggested_tools: parsed.suggested_tools.into_iter().take(5).collect(),
        complexity: parsed.complexity,
        multi_step: parsed.multi_step,
        estimated_steps: estimated_steps.max(1),
        confidence: MODEL_CONFIDENCE,
        entities: Default::default(),
        references_history: parsed.references_history,
        output_format: parsed.output_format.unwrap_or_default(),
        source: IntentSource::Model,
    })
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|t| t == item) {
        list.push(item.to_string());
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
