//! `steward classify`: print the intent for a message.

use std::path::Path;

use steward_agent::IntentClassifier;

use crate::app::{self, CliResult};

pub async fn run(config_path: &Path, message: &str) -> CliResult<()> {
    let config = app::load_config(config_path)?;
    let tools: Vec<String> = steward_tools::default_registry(&config.tools)
        .names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut classifier = IntentClassifier::new(config.intent.clone());
    if config.intent.use_model {
        let provider = app::build_provider(&config)?;
        classifier = classifier.with_provider(provider, config.model.model.clone());
    }

    let intent = classifier.classify(message, &[], &tools).await;
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}
