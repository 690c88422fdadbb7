//! Model service implementations for Steward.
//!
//! All providers implement the `steward_core::Provider` trait.

pub mod openai_compat;

use std::sync::Arc;
use std::time::Duration;

use steward_config::ModelConfig;
use steward_core::error::ProviderError;
use steward_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured model provider.
pub fn build_provider(config: &ModelConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    if config.base_url.trim().is_empty() {
        return Err(ProviderError::NotConfigured("model.base_url is empty".into()));
    }
    let name = if config.base_url.contains("localhost:11434") {
        "ollama"
    } else {
        "openai-compatible"
    };
    Ok(Arc::new(OpenAiCompatProvider::with_timeout(
        name,
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
        Duration::from_secs(config.request_timeout_secs),
    )))
}
