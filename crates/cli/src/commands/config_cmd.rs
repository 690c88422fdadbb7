//! `steward config`: configuration management commands.

use std::path::Path;

use steward_config::AppConfig;

use crate::app::{self, CliResult};

pub fn init(config_path: &Path, force: bool) -> CliResult<()> {
    if config_path.exists() && !force {
        println!("Config already exists at {} (use --force to overwrite)", config_path.display());
        return Ok(());
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("Wrote {}", config_path.display());
    println!("Set STEWARD_API_KEY (or OPENAI_API_KEY), then run `steward chat`.");
    Ok(())
}

pub fn show(config_path: &Path) -> CliResult<()> {
    let mut config = app::load_config(config_path)?;
    if config.model.api_key.is_some() {
        config.model.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(config_path: &Path) {
    println!("{}", config_path.display());
}

pub fn validate(config_path: &Path) -> CliResult<()> {
    let config = app::load_config(config_path)?;

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (STEWARD_API_KEY or OPENAI_API_KEY)".to_string());
    }
    if let Some(dir) = &config.knowledge.directory
        && !dir.is_dir()
    {
        warnings.push(format!("knowledge.directory {} does not exist", dir.display()));
    }
    if let Some(root) = &config.tools.workspace_root
        && !root.is_dir()
    {
        warnings.push(format!("tools.workspace_root {} does not exist", root.display()));
    }

    println!("Config OK: {}", config_path.display());
    for w in &warnings {
        println!("  warning: {w}");
    }
    println!("  model:    {} @ {}", config.model.model, config.model.base_url);
    println!("  store:    {:?}", config.store.kind);
    println!("  budget:   {} tokens", config.context.budget_tokens);
    Ok(())
}
