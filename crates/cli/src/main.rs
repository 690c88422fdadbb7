//! Steward CLI, the main entry point.
//!
//! Commands:
//! - `chat`: interactive or single-message chat
//! - `classify`: show the intent for a message
//! - `tools`: list tools or rank them for a task
//! - `compact`: compact a stored session
//! - `clear`: forget a stored session
//! - `config`: create, show or validate the config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod app;
mod commands;

#[derive(Parser)]
#[command(
    name = "steward",
    about = "Steward: a tool-using assistant that thinks before it acts",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.steward/config.toml)
    #[arg(short, long, global = true, env = "STEWARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Session to continue
        #[arg(short, long, default_value = "default")]
        session: String,

        /// User id for style preferences
        #[arg(short, long)]
        user: Option<String>,

        /// Attach a file to the message (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Print every turn event as a JSON line
        #[arg(long)]
        events: bool,
    },

    /// Classify a message and print the intent
    Classify {
        message: String,
    },

    /// List tools, or rank them for a task
    Tools {
        /// Rank tools for this task instead of listing them
        #[arg(long)]
        select: Option<String>,

        #[arg(long, default_value_t = 5)]
        max: usize,
    },

    /// Compact a stored session
    Compact {
        session: String,

        /// Compact even below the threshold
        #[arg(long)]
        force: bool,
    },

    /// Forget a stored session
    Clear {
        session: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Check the configuration
    Validate,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.clone().unwrap_or_else(app::default_config_path);

    match cli.command {
        Commands::Chat {
            message,
            session,
            user,
            files,
            events,
        } => {
            let options = commands::chat::ChatOptions {
                session,
                user,
                files,
                events,
            };
            commands::chat::run(&config_path, message, options).await?
        }
        Commands::Classify { message } => commands::classify::run(&config_path, &message).await?,
        Commands::Tools { select, max } => commands::tools::run(&config_path, select, max).await?,
        Commands::Compact { session, force } => {
            commands::session::compact(&config_path, &session, force).await?
        }
        Commands::Clear { session } => commands::session::clear(&config_path, &session).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config_cmd::init(&config_path, force)?,
            ConfigAction::Show => commands::config_cmd::show(&config_path)?,
            ConfigAction::Path => commands::config_cmd::path(&config_path),
            ConfigAction::Validate => commands::config_cmd::validate(&config_path)?,
        },
    }

    Ok(())
}
