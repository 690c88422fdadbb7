//! ReAct control loop: Thought → Action → Observation.
//!
//! One call to [`ReactLoop::run`] handles one user message. The loop
//! classifies the message, assembles context once, then alternates model
//! calls and tool executions until the model answers, the iteration budget
//! runs out, or the model fails. Progress is reported on a [`TurnEvent`]
//! channel that always ends with exactly one terminal event.

pub mod action;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use steward_config::{AgentConfig, AppConfig, CompactionConfig, ContextConfig, IntentConfig};
use steward_core::cache::ToolResultCache;
use steward_core::error::ProviderError;
use steward_core::event::{DomainEvent, EventBus};
use steward_core::intent::Intent;
use steward_core::provider::{Provider, ProviderRequest, Usage};
use steward_core::session::{Role, Session, Turn, TurnKind, TurnMetadata};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compactor::SessionCompactor;
use crate::context::{
    ContextAssembler, ContextBuilder, ContextContribution, ContextInputs, ContextSource, FileReference,
    Priority, TokenBudget, TokenEstimator,
};
use crate::intent::IntentClassifier;
use crate::orchestrator::{ToolOrchestrator, ToolSelection};
use crate::stream_event::{TerminalState, TurnEvent};

pub use action::{Action, ActionParseError, ToolCallRequest, parse_action};

const ACTION_PROTOCOL: &str = "\
Reply with exactly one JSON object and nothing else.
To call a tool: {\"action\": \"tool_call\", \"thought\": \"<why>\", \"tool\": \"<name>\", \"arguments\": {...}}
To answer the user: {\"action\": \"final_answer\", \"thought\": \"<why>\", \"answer\": \"<answer>\"}
Independent calls may be batched: {\"thought\": \"<why>\", \"tool_calls\": [{\"tool\": \"<name>\", \"arguments\": {...}}]}
Tool results come back as observations. Never invent an observation.";

const OBSERVATION_EXCERPT_CHARS: usize = 200;

/// One user message plus the per-turn inputs that travel with it.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub message: String,
    pub user_id: Option<String>,
    pub file_refs: Vec<FileReference>,
    pub skills: Vec<String>,
    pub extra_context: Vec<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_file(mut self, file: FileReference) -> Self {
        self.file_refs.push(file);
        self
    }

    pub fn with_skill(mut self, instructions: impl Into<String>) -> Self {
        self.skills.push(instructions.into());
        self
    }

    pub fn with_extra_context(mut self, text: impl Into<String>) -> Self {
        self.extra_context.push(text.into());
        self
    }
}

/// Where the loop is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Thinking,
    Acting,
    Observing,
    Answered,
    Failed,
    Aborted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answered | Self::Failed | Self::Aborted)
    }
}

/// How a turn ended, for callers that don't consume the event stream.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: TerminalState,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub iterations: u32,
    pub used_tools: Vec<String>,
    pub intent: Intent,
    pub duration_ms: u64,
    pub partial: bool,
    pub compacted: bool,
}

/// Per-run bookkeeping.
struct RunState {
    run_id: String,
    state: LoopState,
    iterations: u32,
    max_iterations: u32,
    step: usize,
    tool_calls: usize,
    parse_failures: u32,
    used_tools: Vec<String>,
}

impl RunState {
    fn transition(&mut self, next: LoopState) {
        debug!(run_id = %self.run_id, from = ?self.state, to = ?next, "Loop state");
        self.state = next;
    }

    fn note_tool(&mut self, tool: &str) {
        if !self.used_tools.iter().any(|t| t == tool) {
            self.used_tools.push(tool.to_string());
        }
    }
}

pub struct ReactLoop {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: Option<u32>,
    classifier: IntentClassifier,
    context: ContextBuilder,
    assembler: ContextAssembler,
    orchestrator: Arc<ToolOrchestrator>,
    compactor: SessionCompactor,
    config: AgentConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl ReactLoop {
    /// A loop with default settings and rule-based intent classification.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, orchestrator: Arc<ToolOrchestrator>) -> Self {
        let context = ContextConfig::default();
        let estimator = TokenEstimator::new(context.chars_per_token);
        Self {
            provider,
            model: model.into(),
            max_tokens: None,
            classifier: IntentClassifier::new(IntentConfig::default()),
            assembler: ContextAssembler::new(
                TokenBudget::new(context.budget_tokens, context.reserve_tokens),
                estimator,
            ),
            context: ContextBuilder::new(context),
            orchestrator,
            compactor: SessionCompactor::new(CompactionConfig::default(), estimator),
            config: AgentConfig::default(),
            event_bus: None,
        }
    }

    /// Wire every component from the application config.
    pub fn from_config(provider: Arc<dyn Provider>, orchestrator: Arc<ToolOrchestrator>, config: &AppConfig) -> Self {
        let model = config.model.model.clone();
        let estimator = TokenEstimator::new(config.context.chars_per_token);

        let mut classifier = IntentClassifier::new(config.intent.clone());
        if config.intent.use_model {
            classifier = classifier.with_provider(provider.clone(), model.clone());
        }

        let mut compactor = SessionCompactor::new(config.compaction.clone(), estimator);
        if config.compaction.summarize_with_model {
            compactor = compactor.with_summarizer(provider.clone(), model.clone());
        }

        Self {
            provider,
            model,
            max_tokens: Some(config.model.max_tokens),
            classifier,
            context: ContextBuilder::new(config.context.clone()),
            assembler: ContextAssembler::new(
                TokenBudget::new(config.context.budget_tokens, config.context.reserve_tokens),
                estimator,
            ),
            orchestrator,
            compactor,
            config: config.agent.clone(),
            event_bus: None,
        }
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_compactor(mut self, compactor: SessionCompactor) -> Self {
        self.compactor = match &self.event_bus {
            Some(bus) => compactor.with_event_bus(bus.clone()),
            None => compactor,
        };
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Publish loop and compaction events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.compactor = self.compactor.with_event_bus(bus.clone());
        self.event_bus = Some(bus);
        self
    }

    pub fn orchestrator(&self) -> &Arc<ToolOrchestrator> {
        &self.orchestrator
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn compactor(&self) -> &SessionCompactor {
        &self.compactor
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Iteration budget for a classified message.
    pub fn iteration_budget(&self, intent: &Intent) -> u32 {
        intent
            .estimated_steps
            .saturating_mul(2)
            .saturating_add(2)
            .max(self.config.min_iterations)
            .min(self.config.max_iterations)
    }

    /// Run one turn against `session`, reporting progress on `tx`.
    ///
    /// The session is updated in place: the user message, every model reply
    /// and observation, cache entries, usage counters and any compaction.
    /// Send failures on `tx` are ignored so a dropped receiver never
    /// interrupts bookkeeping.
    pub async fn run(&self, session: &mut Session, request: &TurnRequest, tx: &mpsc::Sender<TurnEvent>) -> TurnOutcome {
        let started = Instant::now();
        let session_id = session.id.to_string();
        let mut run = RunState {
            run_id: Uuid::new_v4().to_string(),
            state: LoopState::Idle,
            iterations: 0,
            max_iterations: 0,
            step: 0,
            tool_calls: 0,
            parse_failures: 0,
            used_tools: Vec::new(),
        };

        info!(session_id = %session_id, run_id = %run.run_id, model = %self.model, "Turn starting");
        self.publish(DomainEvent::TurnStarted {
            session_id: session_id.clone(),
            timestamp: Utc::now(),
        });

        // ── Classify ──
        let history = session.transcript().to_vec();
        let tool_names = self.orchestrator.names();
        let intent = self.classifier.classify(&request.message, &history, &tool_names).await;
        run.max_iterations = self.iteration_budget(&intent);
        let _ = tx
            .send(TurnEvent::Thinking {
                content: format!("Intent: {}", intent.summary()),
            })
            .await;
        self.publish(DomainEvent::IntentClassified {
            session_id: session_id.clone(),
            task_type: intent.task_type.as_str().to_string(),
            confidence: intent.confidence,
            source: format!("{:?}", intent.source).to_lowercase(),
            timestamp: Utc::now(),
        });

        // ── Assemble context once ──
        let recommended = self.recommend_tools(&request.message, &intent).await;
        let catalog = self.orchestrator.catalog_summary();
        let mut contributions = self
            .context
            .build(&ContextInputs {
                message: &request.message,
                intent: &intent,
                history: &history,
                file_refs: &request.file_refs,
                skills: &request.skills,
                extra: &request.extra_context,
                tool_catalog: &catalog,
                recommended_tools: &recommended,
                cache: &session.tool_cache,
                run_id: &run.run_id,
                user_id: request.user_id.as_deref(),
            })
            .await;
        contributions.push(
            ContextContribution::new(ContextSource::SystemInstructions, Priority::Critical, ACTION_PROTOCOL)
                .with_label("action-protocol"),
        );
        let assembled = self.assembler.assemble(contributions);
        if assembled.metadata.overflow {
            warn!(
                session_id = %session_id,
                tokens = assembled.metadata.total_tokens,
                limit = assembled.metadata.limit,
                "Critical context exceeds the budget"
            );
        }
        self.publish(DomainEvent::ContextAssembled {
            session_id: session_id.clone(),
            tokens: assembled.metadata.total_tokens,
            limit: assembled.metadata.limit,
            dropped: assembled.metadata.drops.len(),
            overflow: assembled.metadata.overflow,
            timestamp: Utc::now(),
        });

        let run_start = session.len();
        session.push(Turn::user(request.message.clone()));

        // ── Think / act / observe ──
        let mut answer: Option<String> = None;
        let mut error: Option<String> = None;

        while !run.state.is_terminal() {
            if run.iterations >= run.max_iterations {
                run.transition(LoopState::Aborted);
                break;
            }
            run.iterations += 1;
            run.transition(LoopState::Thinking);

            let turns = session.transcript()[run_start..].to_vec();
            let mut model_request = ProviderRequest::new(self.model.clone(), turns)
                .with_context(assembled.text.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.max_tokens);
            model_request.stream = true;

            let reply = match self.call_model(model_request).await {
                Ok((reply, usage)) => {
                    session.usage.model_calls += 1;
                    if let Some(usage) = usage {
                        session.usage.prompt_tokens += u64::from(usage.prompt_tokens);
                        session.usage.completion_tokens += u64::from(usage.completion_tokens);
                    }
                    reply
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Model call failed");
                    error = Some(e.to_string());
                    run.transition(LoopState::Failed);
                    break;
                }
            };

            match parse_action(&reply) {
                Err(e) => {
                    run.parse_failures += 1;
                    session.push(Turn::assistant(reply.clone()));
                    if run.parse_failures >= 2 {
                        warn!(session_id = %session_id, error = %e, "Reply unparseable twice, using it as the answer");
                        answer = Some(reply.trim().to_string());
                        run.transition(LoopState::Answered);
                    } else {
                        debug!(session_id = %session_id, error = %e, "Asking the model to correct its reply");
                        session.push(correction_turn(&e));
                    }
                }
                Ok(Action::FinalAnswer {
                    answer: text,
                    thought,
                    implicit,
                }) => {
                    if implicit {
                        warn!(session_id = %session_id, "Reply carried no action, treating it as the final answer");
                    }
                    if let Some(thought) = thought {
                        let _ = tx.send(TurnEvent::Thinking { content: thought }).await;
                    }
                    session.push(Turn::assistant(text.clone()));
                    answer = Some(text);
                    run.transition(LoopState::Answered);
                }
                Ok(Action::ToolCalls { calls, thought }) => {
                    run.parse_failures = 0;
                    if let Some(thought) = thought {
                        let _ = tx.send(TurnEvent::Thinking { content: thought }).await;
                    }
                    session.push(Turn::assistant(reply));

                    run.transition(LoopState::Acting);
                    self.act(session, &mut run, calls, tx).await;

                    run.transition(LoopState::Observing);
                    let _ = tx
                        .send(TurnEvent::Progress {
                            iteration: run.iterations,
                            max_iterations: run.max_iterations,
                            tool_calls: run.tool_calls,
                        })
                        .await;
                }
            }
        }

        // ── Finish ──
        let partial = run.state == LoopState::Aborted;
        if partial {
            warn!(
                session_id = %session_id,
                iterations = run.iterations,
                "Iteration budget exhausted"
            );
            let summary = partial_summary(&session.transcript()[run_start..], run.max_iterations);
            session.push(Turn::assistant(summary.clone()));
            answer = Some(summary);
        }

        if let Some(text) = &answer {
            let _ = tx.send(TurnEvent::Text { content: text.clone() }).await;
        }

        let compacted = match run.state {
            LoopState::Answered | LoopState::Aborted => self.compactor.auto_compact(session).await.is_some(),
            _ => false,
        };

        let terminal = match run.state {
            LoopState::Answered => TerminalState::Answered,
            LoopState::Aborted => TerminalState::Aborted,
            _ => TerminalState::Failed,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match terminal {
            TerminalState::Failed => {
                let message = error.clone().unwrap_or_else(|| "turn failed".into());
                self.publish(DomainEvent::ErrorOccurred {
                    context: format!("session {session_id}"),
                    error_message: message.clone(),
                    timestamp: Utc::now(),
                });
                let _ = tx.send(TurnEvent::Error { message }).await;
            }
            _ => {
                let _ = tx
                    .send(TurnEvent::Complete {
                        state: terminal,
                        iterations: run.iterations,
                        duration_ms,
                        used_tools: run.used_tools.clone(),
                        intent: Some(Box::new(intent.clone())),
                        partial,
                        compacted,
                    })
                    .await;
            }
        }

        info!(
            session_id = %session_id,
            state = %terminal,
            iterations = run.iterations,
            tool_calls = run.tool_calls,
            duration_ms,
            "Turn finished"
        );
        self.publish(DomainEvent::TurnFinished {
            session_id,
            state: terminal.to_string(),
            iterations: run.iterations,
            duration_ms,
            timestamp: Utc::now(),
        });

        TurnOutcome {
            state: terminal,
            answer,
            error,
            iterations: run.iterations,
            used_tools: run.used_tools,
            intent,
            duration_ms,
            partial,
            compacted,
        }
    }

    /// Execute one batch of requested calls and append their observations.
    async fn act(
        &self,
        session: &mut Session,
        run: &mut RunState,
        calls: Vec<ToolCallRequest>,
        tx: &mpsc::Sender<TurnEvent>,
    ) {
        // (step, call, signature) for calls that actually need to run
        let mut pending: Vec<(usize, ToolCallRequest, String)> = Vec::new();
        // repeats of a pending call within the same batch
        let mut duplicates: Vec<(usize, ToolCallRequest, String)> = Vec::new();

        for call in calls {
            run.step += 1;
            let step = run.step;
            let _ = tx
                .send(TurnEvent::ToolCall {
                    step,
                    tool: call.tool.clone(),
                    arguments: call.arguments.clone(),
                })
                .await;

            let signature = ToolResultCache::signature(&call.tool, &call.arguments);
            let hit = session.tool_cache.lookup(&run.run_id, &signature).cloned();
            if let Some(hit) = hit {
                debug!(tool = %call.tool, "Serving repeated call from cache");
                run.note_tool(&call.tool);
                session.push(Turn::observation(
                    &call.tool,
                    call.arguments.clone(),
                    hit.success,
                    hit.output.clone(),
                ));
                let _ = tx
                    .send(TurnEvent::ToolResult {
                        step,
                        tool: call.tool,
                        success: hit.success,
                        output: hit.output,
                        cached: true,
                        duration_ms: 0,
                    })
                    .await;
            } else if pending.iter().any(|(_, _, s)| *s == signature) {
                duplicates.push((step, call, signature));
            } else {
                pending.push((step, call, signature));
            }
        }

        if pending.is_empty() {
            return;
        }

        let selections: Vec<ToolSelection> = pending
            .iter()
            .map(|(_, call, _)| {
                ToolSelection::new(&call.tool, 1.0, "requested by the model").with_arguments(call.arguments.clone())
            })
            .collect();
        let plan = self.orchestrator.plan(&selections);
        let outcome = self.orchestrator.execute_plan(&plan).await;

        let mut by_signature: HashMap<String, (bool, String)> = HashMap::new();
        for (index, (step, call, signature)) in pending.into_iter().enumerate() {
            let Some(result) = outcome.step(index + 1) else {
                continue;
            };
            if result.attempted {
                run.tool_calls += 1;
                session.usage.tool_calls += 1;
            }
            run.note_tool(&call.tool);
            session.tool_cache.record(
                &run.run_id,
                &call.tool,
                call.arguments.clone(),
                result.output.clone(),
                result.success,
            );
            session.push(Turn::observation(
                &call.tool,
                call.arguments.clone(),
                result.success,
                result.output.clone(),
            ));
            let _ = tx
                .send(TurnEvent::ToolResult {
                    step,
                    tool: call.tool,
                    success: result.success,
                    output: result.output.clone(),
                    cached: false,
                    duration_ms: result.duration_ms,
                })
                .await;
            by_signature.insert(signature, (result.success, result.output.clone()));
        }

        for (step, call, signature) in duplicates {
            let Some((success, output)) = by_signature.get(&signature).cloned() else {
                continue;
            };
            session.push(Turn::observation(&call.tool, call.arguments.clone(), success, output.clone()));
            let _ = tx
                .send(TurnEvent::ToolResult {
                    step,
                    tool: call.tool,
                    success,
                    output,
                    cached: true,
                    duration_ms: 0,
                })
                .await;
        }
    }

    /// Tools worth pointing the model at: classifier suggestions first, then
    /// the orchestrator's lexical picks.
    async fn recommend_tools(&self, message: &str, intent: &Intent) -> Vec<String> {
        let max = self.orchestrator.config().max_selected;
        let mut seen = HashSet::new();
        let mut lines = Vec::new();

        for tool in &intent.suggested_tools {
            if self.orchestrator.descriptor(tool).is_some() && seen.insert(tool.clone()) {
                lines.push(format!("- {tool}: suggested by request analysis"));
            }
        }
        for selection in self.orchestrator.select_tools(message, max).await {
            if seen.insert(selection.tool.clone()) {
                lines.push(format!(
                    "- {} ({:.0}%): {}",
                    selection.tool,
                    selection.confidence * 100.0,
                    selection.reason
                ));
            }
        }

        lines.truncate(max);
        lines
    }

    /// Stream one model reply to completion under the model timeout.
    async fn call_model(&self, request: ProviderRequest) -> Result<(String, Option<Usage>), ProviderError> {
        let secs = self.config.model_timeout_secs;
        let collect = async {
            let mut rx = self.provider.stream(request).await?;
            let mut text = String::new();
            let mut usage = None;
            while let Some(chunk) = rx.recv().await {
                let chunk = chunk?;
                if let Some(content) = chunk.content {
                    text.push_str(&content);
                }
                if chunk.usage.is_some() {
                    usage = chunk.usage;
                }
                if chunk.done {
                    break;
                }
            }
            Ok::<_, ProviderError>((text, usage))
        };

        let (text, usage) = tokio::time::timeout(Duration::from_secs(secs), collect)
            .await
            .map_err(|_| ProviderError::Timeout(format!("model did not answer within {secs}s")))??;

        if text.trim().is_empty() {
            return Err(ProviderError::InvalidResponse("model returned an empty reply".into()));
        }
        Ok((text, usage))
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn correction_turn(error: &ActionParseError) -> Turn {
    let text = format!(
        "Your last reply could not be used: {error}. \
         Reply again with exactly one JSON object using \"tool_call\" or \"final_answer\"."
    );
    Turn::system(text).with_metadata(TurnMetadata {
        kind: Some(TurnKind::ParseCorrection),
        ..TurnMetadata::default()
    })
}

/// Best-effort answer built from this run's observations.
fn partial_summary(turns: &[Turn], max_iterations: u32) -> String {
    let observations: Vec<String> = turns
        .iter()
        .filter(|t| t.role == Role::ToolObservation)
        .map(|t| {
            let tool = t.metadata.tool_name.as_deref().unwrap_or("tool");
            let excerpt: String = t.content.chars().take(OBSERVATION_EXCERPT_CHARS).collect();
            let marker = if t.content.chars().count() > OBSERVATION_EXCERPT_CHARS {
                "..."
            } else {
                ""
            };
            format!("- {tool}: {excerpt}{marker}")
        })
        .collect();

    if observations.is_empty() {
        return format!("I stopped after {max_iterations} steps without reaching an answer.");
    }
    format!(
        "I stopped after {max_iterations} steps before finishing. What I found so far:\n{}",
        observations.join("\n")
    )
}
