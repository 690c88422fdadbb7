//! Narrow interfaces to the systems around the control core.
//!
//! The core never knows how knowledge is indexed, how sessions are stored or
//! where style preferences come from. It only calls these traits; concrete
//! implementations live in `steward-memory` or in the embedding application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RetrievalError, StoreError};
use crate::session::{Session, SessionId};

/// A ranked passage returned by a knowledge retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub content: String,
    /// Where the passage came from (document path, URL, ...)
    pub source: String,
    pub score: f32,
}

/// Search over an external knowledge base.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    fn name(&self) -> &str;

    /// Best `top_k` passages for `query`, highest score first.
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgeChunk>, RetrievalError>;
}

/// Persistence for sessions.
///
/// `load` returns `Ok(None)` for a session that was never saved.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Forget a session. Returns whether anything was removed.
    async fn delete(&self, _id: &SessionId) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// Source of a per-user style prompt.
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    async fn style_prompt(&self, user_id: &str) -> Option<String>;
}
