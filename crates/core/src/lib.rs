//! # Steward Core
//!
//! Domain types, collaborator traits, and error definitions for the Steward
//! assistant control core. This crate has **no framework dependencies**: it
//! defines the model the agent, the adapters and the CLI all build on.
//!
//! ## Design Philosophy
//!
//! Every external system (model service, tools, knowledge base, session
//! store, preference source) is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted providers and tools
//! - Clean dependency graph (all crates depend inward on core)

pub mod cache;
pub mod collaborator;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod intent;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use cache::{CachedToolCall, ToolResultCache};
pub use collaborator::{KnowledgeChunk, KnowledgeRetriever, PreferenceSource, SessionStore};
pub use descriptor::{ToolCapability, ToolCategory, ToolDescriptor};
pub use error::{Error, ProviderError, Result, RetrievalError, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use intent::{Capability, Complexity, Entities, Intent, IntentSource, OutputFormat, TaskType};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use session::{Role, Session, SessionId, Turn, TurnKind, TurnMetadata, UsageCounters};
pub use tool::{RegisteredTool, Tool, ToolOutput, ToolRegistry};
