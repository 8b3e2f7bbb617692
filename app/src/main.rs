//! AI Mail - command line entry point

use aimail_core::{Config, FileSessionStore, HttpMailApi, SessionContext};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, info};

mod commands;
mod notifications;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Configuration directory
    #[arg(long)]
    config_dir: Option<String>,

    /// Data directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Mail server origin, overrides the configuration file
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a fresh ephemeral identity and sign in with it
    Generate,
    /// Sign in to an existing identity
    Login {
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the saved session
    Logout,
    /// List the inbox once
    Inbox,
    /// Keep the inbox in sync and announce new mail until interrupted
    Watch,
    /// Show one email
    Show { id: String },
    /// Reply to an email
    Reply {
        id: String,
        #[arg(short, long)]
        body: String,
    },
}

fn init_logging(debug: bool, configured: &str) {
    let log_level = if debug { "debug" } else { configured };

    tracing_subscriber::fmt()
        .with_max_level(match log_level {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        })
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let defaults = Config::load_from_env();
    let path = defaults.config_file_path();
    let mut config = Config::load(&path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .with_env_overrides();

    if let Some(server) = &args.server {
        config.server.base_url = server.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Directory flags win over the environment
    if let Some(config_dir) = &args.config_dir {
        std::env::set_var("AIMAIL_CONFIG_DIR", config_dir);
    }
    if let Some(data_dir) = &args.data_dir {
        std::env::set_var("AIMAIL_DATA_DIR", data_dir);
    }

    let config = load_config(&args)?;
    init_logging(args.debug, &config.app.log_level);

    info!("Starting {} v{}", aimail_core::APP_NAME, aimail_core::VERSION);
    debug!("Using server {}", config.server.base_url);

    let api = Arc::new(HttpMailApi::new(&config.server)?);
    let store = FileSessionStore::new(config.session_file_path());
    let mut sessions = SessionContext::new(api.clone(), Box::new(store));

    match args.command {
        Command::Generate => commands::generate(&mut sessions).await,
        Command::Login { username, password } => commands::login(&mut sessions, &username, &password).await,
        Command::Logout => commands::logout(&mut sessions),
        Command::Inbox => commands::inbox(api.as_ref(), &mut sessions).await,
        Command::Watch => commands::watch(&config, api, &mut sessions).await,
        Command::Show { id } => commands::show(api.as_ref(), &id).await,
        Command::Reply { id, body } => commands::reply(api.as_ref(), &mut sessions, &id, &body).await,
    }
}
