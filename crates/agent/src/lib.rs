//! The control core of Steward.
//!
//! Each user message goes through a **Classify → Assemble → Think/Act/Observe**
//! cycle:
//!
//! 1. **Classify** the message into an [`Intent`](steward_core::Intent)
//! 2. **Assemble** a budgeted context from prioritized sources
//! 3. **Ask the model** for one action: a tool call or a final answer
//! 4. **If tool calls**: plan and execute them, append observations, loop back to step 3
//! 5. **If an answer**: stream it out, then compact the session when it has grown too long
//!
//! The loop ends when the model answers, the model fails, or the iteration
//! budget runs out. Every turn ends with exactly one terminal event.

pub mod compactor;
pub mod context;
pub mod engine;
pub mod intent;
pub mod orchestrator;
pub mod react;
pub mod reply;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use compactor::{CompactionResult, SessionCompactor};
pub use context::{
    AssembledContext, AssemblyMetadata, ContextAssembler, ContextBuilder, ContextContribution, ContextSource,
    FileReference, Priority, TokenBudget, TokenEstimator,
};
pub use engine::{Engine, EngineError, EngineStats, TurnSummary};
pub use intent::{IntentClassifier, IntentError};
pub use orchestrator::{
    ExecutionOutcome, OrchestrationPlan, PlanOutcome, PlanStep, StepResult, ToolOrchestrator, ToolSelection,
    ToolUsage,
};
pub use react::{Action, ActionParseError, LoopState, ReactLoop, TurnOutcome, TurnRequest};
pub use stream_event::{TerminalState, TurnEvent};
