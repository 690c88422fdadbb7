//! `steward tools`: list tools or rank them for a task.

use std::path::Path;
use std::sync::Arc;

use steward_core::event::EventBus;

use crate::app::{self, CliResult};

pub async fn run(config_path: &Path, select: Option<String>, max: usize) -> CliResult<()> {
    let config = app::load_config(config_path)?;

    let Some(task) = select else {
        let registry = steward_tools::default_registry(&config.tools);
        for d in registry.descriptors() {
            let danger = if d.dangerous { "  [dangerous]" } else { "" };
            println!(
                "{:<18} {:<15} {:>4}s  {}{danger}",
                d.name,
                d.category,
                d.timeout.as_secs(),
                d.description
            );
        }
        return Ok(());
    };

    let provider = app::build_provider(&config)?;
    let orchestrator = app::build_orchestrator(&config, &provider, &Arc::new(EventBus::default()));
    let selections = orchestrator.select_tools(&task, max).await;
    if selections.is_empty() {
        println!("No tool matches that task.");
    }
    for s in selections {
        println!("{:<18} {:>3.0}%  {}", s.tool, s.confidence * 100.0, s.reason);
    }
    Ok(())
}
