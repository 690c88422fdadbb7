//! Tool execution: timeouts, retries, fallbacks and plan scheduling.
//!
//! Every attempt runs the tool body in its own task under a worker permit.
//! A panic inside the tool surfaces as a `JoinError` and becomes a failed
//! result; a timeout aborts the task and moves on to the fallback chain.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use steward_core::error::ToolError;
use steward_core::event::DomainEvent;
use steward_core::tool::{RegisteredTool, ToolOutput};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::ToolOrchestrator;
use super::plan::{OrchestrationPlan, PlanStep};

/// Error text reported for a call that ran out of time.
pub const TIMEOUT_ERROR: &str = "timeout";
/// Error text reported for a plan step whose dependencies failed.
pub const DEPENDENCY_UNMET: &str = "dependency unmet";

/// Result of one `execute` call, after retries and fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// The tool that produced this result (a fallback, possibly)
    pub tool: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    fn from_output(tool: &str, output: ToolOutput, attempts: u32) -> Self {
        Self {
            tool: tool.to_string(),
            success: output.success,
            output: output.output,
            error: None,
            data: output.data,
            attempts,
            duration_ms: 0,
        }
    }

    /// `error` holds the short reason and `output` the full message.
    fn timed_out(tool: &str, limit: Duration) -> Self {
        let detail = ToolError::Timeout {
            tool_name: tool.to_string(),
            timeout_secs: limit.as_secs_f64().ceil() as u64,
        };
        Self {
            output: detail.to_string(),
            ..Self::failure(tool, TIMEOUT_ERROR, 1)
        }
    }

    fn failure(tool: &str, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            data: None,
            attempts,
            duration_ms: 0,
        }
    }

    /// Text fed back to the model.
    pub fn observation(&self) -> String {
        match (&self.error, self.success) {
            (_, true) => self.output.clone(),
            (Some(error), false) if self.output.is_empty() => format!("Error: {error}"),
            (Some(error), false) => format!("Error: {error} ({})", self.output),
            (None, false) => format!("Failed: {}", self.output),
        }
    }
}

/// Result of one plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    /// The tool the step asked for
    pub tool: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// False when no tool ran: unmet dependencies or an unknown tool
    pub attempted: bool,
}

impl StepResult {
    fn from_outcome(step: &PlanStep, outcome: ExecutionOutcome) -> Self {
        let output = outcome.observation();
        Self {
            step: step.step,
            tool: step.tool.clone(),
            success: outcome.success,
            output,
            error: outcome.error,
            duration_ms: outcome.duration_ms,
            attempted: outcome.attempts > 0,
        }
    }

    fn skipped(step: &PlanStep) -> Self {
        Self {
            step: step.step,
            tool: step.tool.clone(),
            success: false,
            output: format!("Error: {DEPENDENCY_UNMET}"),
            error: Some(DEPENDENCY_UNMET.into()),
            duration_ms: 0,
            attempted: false,
        }
    }
}

/// Results of a whole plan, ordered by step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub steps: Vec<StepResult>,
}

impl PlanOutcome {
    /// First result for `tool`.
    pub fn get(&self, tool: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.tool == tool)
    }

    pub fn step(&self, step: usize) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == step)
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }
}

enum Attempt {
    Finished(ExecutionOutcome),
    TimedOut,
}

impl ToolOrchestrator {
    /// Run one tool. `timeout` overrides the descriptor's timeout.
    ///
    /// Execution errors are retried up to the descriptor's retry count. A
    /// timeout is never retried; the fallback chain is tried instead, each
    /// tool at most once.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending: VecDeque<String> = VecDeque::from([name.to_string()]);
        let mut last_timed_out = (name.to_string(), timeout.unwrap_or_default());

        while let Some(tool_name) = pending.pop_front() {
            if !visited.insert(tool_name.clone()) {
                continue;
            }
            let Some(registered) = self.registry.get(&tool_name).cloned() else {
                if tool_name == name {
                    let mut outcome =
                        ExecutionOutcome::failure(name, ToolError::NotFound(name.to_string()).to_string(), 0);
                    outcome.duration_ms = started.elapsed().as_millis() as u64;
                    return outcome;
                }
                warn!(tool = %tool_name, "Fallback tool is not registered, skipping");
                continue;
            };

            let limit = timeout.unwrap_or(registered.descriptor.timeout);
            match self.run_with_retries(&registered, &arguments, limit).await {
                Attempt::Finished(mut outcome) => {
                    outcome.duration_ms = started.elapsed().as_millis() as u64;
                    return outcome;
                }
                Attempt::TimedOut => {
                    last_timed_out = (tool_name.clone(), limit);
                    for fallback in &registered.descriptor.fallbacks {
                        if !visited.contains(fallback) {
                            pending.push_back(fallback.clone());
                        }
                    }
                    if let Some(next) = pending.front() {
                        info!(tool = %tool_name, fallback = %next, "Tool timed out, trying fallback");
                    }
                }
            }
        }

        let (tool, limit) = last_timed_out;
        let mut outcome = ExecutionOutcome::timed_out(&tool, limit);
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    async fn run_with_retries(
        &self,
        registered: &RegisteredTool,
        arguments: &serde_json::Value,
        limit: Duration,
    ) -> Attempt {
        let name = registered.descriptor.name.as_str();
        let max_attempts = registered.descriptor.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.run_once(registered, arguments.clone(), limit).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let success = matches!(&result, Some(Ok(output)) if output.success);
            self.record_usage(name, success, elapsed_ms);
            if let Some(bus) = &self.event_bus {
                bus.publish(DomainEvent::ToolExecuted {
                    tool_name: name.to_string(),
                    success,
                    duration_ms: elapsed_ms,
                    timestamp: chrono::Utc::now(),
                });
            }

            match result {
                None => {
                    warn!(tool = name, timeout_ms = limit.as_millis() as u64, "Tool call timed out");
                    return Attempt::TimedOut;
                }
                Some(Ok(output)) => {
                    debug!(tool = name, success = output.success, elapsed_ms, "Tool call finished");
                    return Attempt::Finished(ExecutionOutcome::from_output(name, output, attempt));
                }
                Some(Err(e)) if e.is_retriable() && attempt < max_attempts => {
                    warn!(tool = name, attempt, error = %e, "Tool call failed, retrying");
                }
                Some(Err(e)) => {
                    warn!(tool = name, attempt, error = %e, "Tool call failed");
                    return Attempt::Finished(ExecutionOutcome::failure(name, e.to_string(), attempt));
                }
            }
        }
    }

    /// One attempt. `None` means the deadline passed.
    async fn run_once(
        &self,
        registered: &RegisteredTool,
        arguments: serde_json::Value,
        limit: Duration,
    ) -> Option<Result<ToolOutput, ToolError>> {
        let permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return Some(Err(ToolError::ExecutionFailed {
                    tool_name: registered.descriptor.name.clone(),
                    reason: "worker pool closed".into(),
                }));
            }
        };
        let tool = registered.tool.clone();
        let mut handle = tokio::spawn(async move {
            let _permit = permit;
            tool.execute(arguments).await
        });

        match tokio::time::timeout(limit, &mut handle).await {
            Err(_) => {
                handle.abort();
                None
            }
            Ok(Ok(result)) => Some(result),
            Ok(Err(join_error)) => Some(Err(join_failure(join_error))),
        }
    }

    /// Run a plan: parallel groups first, then the remaining steps in order,
    /// each only once its dependencies have succeeded.
    pub async fn execute_plan(&self, plan: &OrchestrationPlan) -> PlanOutcome {
        let mut results: HashMap<usize, StepResult> = HashMap::new();

        for group in &plan.parallel_groups {
            let steps: Vec<&PlanStep> = group.iter().filter_map(|n| plan.step(*n)).collect();
            let outcomes = join_all(
                steps
                    .iter()
                    .map(|step| self.execute(&step.tool, step.arguments.clone(), None)),
            )
            .await;
            for (step, outcome) in steps.into_iter().zip(outcomes) {
                results.insert(step.step, StepResult::from_outcome(step, outcome));
            }
        }

        for step in &plan.steps {
            if results.contains_key(&step.step) {
                continue;
            }
            let deps_ok = step
                .depends_on
                .iter()
                .all(|d| results.get(d).is_some_and(|r| r.success));
            if !deps_ok {
                debug!(step = step.step, tool = %step.tool, "Skipping step with unmet dependencies");
                results.insert(step.step, StepResult::skipped(step));
                continue;
            }
            let outcome = self.execute(&step.tool, step.arguments.clone(), None).await;
            results.insert(step.step, StepResult::from_outcome(step, outcome));
        }

        let mut steps: Vec<StepResult> = results.into_values().collect();
        steps.sort_by_key(|s| s.step);
        PlanOutcome { steps }
    }
}

fn join_failure(error: JoinError) -> ToolError {
    if error.is_panic() {
        let payload = error.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        ToolError::Panicked(message)
    } else {
        ToolError::Panicked("task cancelled".into())
    }
}
