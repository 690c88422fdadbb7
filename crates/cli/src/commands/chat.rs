//! `steward chat`: interactive or single-message chat.

use std::io::Write;
use std::path::{Path, PathBuf};

use steward_agent::{Engine, FileReference, TerminalState, TurnEvent, TurnRequest};
use steward_core::session::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::{self, CliResult};

pub struct ChatOptions {
    pub session: String,
    pub user: Option<String>,
    pub files: Vec<PathBuf>,
    pub events: bool,
}

fn build_request(message: &str, options: &ChatOptions) -> CliResult<TurnRequest> {
    let mut request = TurnRequest::new(message);
    if let Some(user) = &options.user {
        request = request.with_user(user.clone());
    }
    for path in &options.files {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot attach {}: {e}", path.display()))?;
        request = request.with_file(FileReference::new(path.display().to_string(), content));
    }
    Ok(request)
}

/// Print one event. Returns the terminal state when the turn ended.
fn render(event: &TurnEvent, as_json: bool) -> Option<TerminalState> {
    if as_json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    } else {
        match event {
            TurnEvent::Thinking { content } => eprintln!("  · {content}"),
            TurnEvent::ToolCall { tool, arguments, .. } => eprintln!("  → {tool} {arguments}"),
            TurnEvent::ToolResult {
                tool,
                success,
                cached,
                duration_ms,
                ..
            } => {
                let status = if *success { "ok" } else { "failed" };
                let cached = if *cached { ", cached" } else { "" };
                eprintln!("  ← {tool} {status} ({duration_ms}ms{cached})");
            }
            TurnEvent::Progress { .. } => {}
            TurnEvent::Text { content } => println!("{content}"),
            TurnEvent::Complete { state, iterations, .. } => {
                if *state == TerminalState::Aborted {
                    eprintln!("  [stopped after {iterations} steps]");
                }
            }
            TurnEvent::Error { message } => eprintln!("  [Error] {message}"),
        }
    }

    match event {
        TurnEvent::Complete { state, .. } => Some(*state),
        TurnEvent::Error { .. } => Some(TerminalState::Failed),
        _ => None,
    }
}

async fn send(engine: &Engine, id: &SessionId, request: TurnRequest, as_json: bool) -> CliResult<TerminalState> {
    let mut rx = engine.run_turn(id, request).await?;
    let mut outcome = TerminalState::Failed;
    while let Some(event) = rx.recv().await {
        if let Some(state) = render(&event, as_json) {
            outcome = state;
        }
    }
    Ok(outcome)
}

pub async fn run(config_path: &Path, message: Option<String>, options: ChatOptions) -> CliResult<()> {
    let config = app::load_config(config_path)?;
    let engine = app::build_engine(&config)?;
    let id = SessionId::from(options.session.as_str());

    if let Some(message) = message {
        let request = build_request(&message, &options)?;
        let state = send(&engine, &id, request, options.events).await?;
        if state == TerminalState::Failed {
            return Err("turn failed".into());
        }
        return Ok(());
    }

    eprintln!("Steward ({}, session '{}'). Type 'exit' to quit.", config.model.model, id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("you > ");
        std::io::stderr().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        match build_request(line, &options) {
            Ok(request) => {
                send(&engine, &id, request, options.events).await?;
            }
            Err(e) => eprintln!("  [Error] {e}"),
        }
    }

    let stats = engine.stats();
    eprintln!(
        "{} turns, {} tool calls, {:.0}% tool success",
        stats.turns_processed,
        stats.tool_calls,
        stats.success_rate * 100.0
    );
    Ok(())
}
