//! Wiring from config to a running engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use steward_agent::{ContextBuilder, Engine, ReactLoop, ToolOrchestrator};
use steward_config::{AppConfig, ConfigError};
use steward_core::collaborator::{KnowledgeRetriever, PreferenceSource};
use steward_core::event::EventBus;
use steward_core::provider::Provider;
use steward_memory::{KeywordRetriever, StaticPreferences, build_store};
use tracing::{debug, info, warn};

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub fn default_config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

/// Load `path` (defaults when missing) and apply environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load_from(path)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn build_provider(config: &AppConfig) -> CliResult<Arc<dyn Provider>> {
    if !config.has_api_key() && !config.model.base_url.contains("localhost") {
        warn!(
            base_url = %config.model.base_url,
            "No API key configured; set STEWARD_API_KEY or OPENAI_API_KEY"
        );
    }
    Ok(steward_providers::build_provider(&config.model)?)
}

pub fn build_orchestrator(
    config: &AppConfig,
    provider: &Arc<dyn Provider>,
    bus: &Arc<EventBus>,
) -> ToolOrchestrator {
    let registry = steward_tools::default_registry(&config.tools);
    let mut orchestrator =
        ToolOrchestrator::new(registry, config.tools.clone()).with_event_bus(bus.clone());
    if config.tools.rerank_with_model {
        orchestrator = orchestrator.with_ranker(provider.clone(), config.model.model.clone());
    }
    orchestrator
}

fn build_context(config: &AppConfig) -> ContextBuilder {
    let mut builder = ContextBuilder::new(config.context.clone());

    if let Some(dir) = &config.knowledge.directory {
        match KeywordRetriever::from_directory(dir) {
            Ok(retriever) => {
                info!(path = %dir.display(), passages = retriever.len(), "Knowledge base loaded");
                let retriever: Arc<dyn KnowledgeRetriever> = Arc::new(retriever);
                builder = builder.with_retriever(retriever);
            }
            Err(e) => warn!(path = %dir.display(), error = %e, "Knowledge base unavailable"),
        }
    }

    if !config.preferences.is_empty() {
        let preferences: Arc<dyn PreferenceSource> =
            Arc::new(StaticPreferences::new(config.preferences.clone()));
        builder = builder.with_preferences(preferences);
    }

    builder
}

/// Build the whole control core from config.
pub fn build_engine(config: &AppConfig) -> CliResult<Engine> {
    let provider = build_provider(config)?;
    let bus = Arc::new(EventBus::default());

    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(event = event.event_type(), detail = ?event, "Domain event");
        }
    });

    let orchestrator = Arc::new(build_orchestrator(config, &provider, &bus));
    let agent = ReactLoop::from_config(provider, orchestrator, config)
        .with_context_builder(build_context(config))
        .with_event_bus(bus);

    Ok(Engine::new(agent, build_store(&config.store)))
}
