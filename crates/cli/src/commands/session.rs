//! `steward compact` and `steward clear`: stored session maintenance.

use std::path::Path;

use steward_core::session::SessionId;

use crate::app::{self, CliResult};

pub async fn compact(config_path: &Path, session: &str, force: bool) -> CliResult<()> {
    let config = app::load_config(config_path)?;
    let engine = app::build_engine(&config)?;

    match engine.compact_session(&SessionId::from(session), force).await? {
        Some(result) => println!(
            "Compacted '{session}': {} → {} turns, {} → {} tokens ({:.0}% kept)",
            result.original_turns,
            result.compacted_turns,
            result.original_tokens,
            result.compacted_tokens,
            result.compression_ratio() * 100.0
        ),
        None => println!("Session '{session}' not found or nothing to compact."),
    }
    Ok(())
}

pub async fn clear(config_path: &Path, session: &str) -> CliResult<()> {
    let config = app::load_config(config_path)?;
    let engine = app::build_engine(&config)?;

    if engine.clear_session(&SessionId::from(session)).await? {
        println!("Cleared session '{session}'.");
    } else {
        println!("Session '{session}' not found.");
    }
    Ok(())
}
