//! Tool orchestration: registry access, selection, planning and execution.
//!
//! The orchestrator owns the [`ToolRegistry`] built at startup and is shared
//! by every session through an `Arc`. The only mutable state is the per-tool
//! usage table, guarded by its own mutex.

mod execute;
mod plan;
mod selection;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use steward_config::ToolsConfig;
use steward_core::descriptor::{ToolCategory, ToolDescriptor};
use steward_core::event::EventBus;
use steward_core::provider::Provider;
use steward_core::tool::{Tool, ToolRegistry};
use tokio::sync::Semaphore;

pub use execute::{ExecutionOutcome, PlanOutcome, StepResult};
pub use plan::{OrchestrationPlan, PlanStep};
pub use selection::ToolSelection;

/// Running statistics for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub calls: u64,
    pub successes: u64,
    pub avg_latency_ms: f64,
}

impl ToolUsage {
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }

    fn record(&mut self, success: bool, latency_ms: u64) {
        self.calls += 1;
        if success {
            self.successes += 1;
        }
        self.avg_latency_ms += (latency_ms as f64 - self.avg_latency_ms) / self.calls as f64;
    }
}

pub struct ToolOrchestrator {
    registry: ToolRegistry,
    config: ToolsConfig,
    usage: Mutex<HashMap<String, ToolUsage>>,
    workers: Arc<Semaphore>,
    ranker: Option<Arc<dyn Provider>>,
    ranker_model: String,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolOrchestrator {
    pub fn new(registry: ToolRegistry, config: ToolsConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        Self {
            registry,
            config,
            usage: Mutex::new(HashMap::new()),
            workers,
            ranker: None,
            ranker_model: String::new(),
            event_bus: None,
        }
    }

    /// Enable model reranking of lexical selections.
    pub fn with_ranker(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.ranker = Some(provider);
        self.ranker_model = model.into();
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }

    // ── Registry ──────────────────────────────────────────────────────────

    /// Register a tool, inferring any metadata it does not declare.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> ToolDescriptor {
        self.registry.register(tool)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.registry.descriptor(name)
    }

    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.registry.descriptors().collect()
    }

    pub fn tool_count(&self) -> usize {
        self.registry.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.registry.names().into_iter().map(String::from).collect()
    }

    /// Tools grouped by category, one line each, dangerous ones marked.
    pub fn catalog_summary(&self) -> String {
        let mut groups: BTreeMap<ToolCategory, Vec<String>> = BTreeMap::new();
        for d in self.registry.descriptors() {
            let marker = if d.dangerous { " [dangerous]" } else { "" };
            groups
                .entry(d.category)
                .or_default()
                .push(format!("- {}{}: {}", d.name, marker, d.description));
        }
        groups
            .into_iter()
            .map(|(category, lines)| format!("{}:\n{}", category, lines.join("\n")))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    // ── Usage ─────────────────────────────────────────────────────────────

    pub fn usage(&self, name: &str) -> Option<ToolUsage> {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Usage for every tool that has been called, sorted by name.
    pub fn stats(&self) -> BTreeMap<String, ToolUsage> {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Overall success rate across all calls, 0.0 before the first call.
    pub fn success_rate(&self) -> f64 {
        let usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        let calls: u64 = usage.values().map(|u| u.calls).sum();
        let successes: u64 = usage.values().map(|u| u.successes).sum();
        if calls == 0 {
            0.0
        } else {
            successes as f64 / calls as f64
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|u| u.calls)
            .sum()
    }

    fn record_usage(&self, name: &str, success: bool, latency_ms: u64) {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default()
            .record(success, latency_ms);
    }
}

impl std::fmt::Debug for ToolOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolOrchestrator")
            .field("tools", &self.registry.names())
            .field("max_parallel", &self.config.max_parallel)
            .finish()
    }
}
