//! Collaborator implementations for Steward: session stores, a keyword
//! knowledge retriever and static style preferences.

pub mod file_backend;
pub mod in_memory;
pub mod knowledge;
pub mod preferences;

use std::sync::Arc;

use steward_config::{StoreConfig, StoreKind};
use steward_core::collaborator::SessionStore;

pub use file_backend::FileSessionStore;
pub use in_memory::InMemorySessionStore;
pub use knowledge::KeywordRetriever;
pub use preferences::StaticPreferences;

/// Build the configured session store.
pub fn build_store(config: &StoreConfig) -> Arc<dyn SessionStore> {
    match config.kind {
        StoreKind::Memory => Arc::new(InMemorySessionStore::new()),
        StoreKind::File => {
            let dir = config.path.clone().unwrap_or_else(FileSessionStore::default_path);
            Arc::new(FileSessionStore::new(dir))
        }
    }
}
