//! Context assembly pipeline.
//!
//! A [`ContextBuilder`] turns one turn's inputs into tagged contributions and
//! a [`ContextAssembler`] packs them into the budget.
//!
//! | Tier | Sources |
//! |------|---------|
//! | CRITICAL | System instructions, action protocol |
//! | HIGH | Referenced files, skills, tool catalog, retrieved knowledge |
//! | MEDIUM | Conversation history, earlier tool results, request analysis |
//! | LOW | User style preferences |

pub mod assembler;
pub mod sources;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyMetadata, ContextAssembler, ContextContribution, ContextSource,
    DropInfo, DropReason, Priority, SourceStats, TokenBudget,
};
pub use sources::{ContextBuilder, ContextInputs, FileReference};
pub use token::{TokenEstimator, estimate_tokens};
