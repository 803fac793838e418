// ABOUTME: Entry point for chatclaw — a console chat client with persistent named sessions.
// ABOUTME: Parses CLI args, sets up logging, loads config, and launches the app.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatclaw::app::App;
use chatclaw::config::Config;

#[derive(Debug, Parser)]
#[command(name = "chatclaw", version, about = "Console chat with persistent sessions")]
struct Cli {
    /// Restore this session instead of starting a new one.
    #[arg(long = "session-id", value_name = "ID")]
    session_id: Option<String>,

    /// Backend to use (gemini, ollama, stub); overrides CHATCLAW_BACKEND.
    #[arg(long)]
    backend: Option<String>,

    /// Model name passed to the backend.
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load local .env if present before reading the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    config.apply_env();
    if let Some(backend) = cli.backend {
        config.backend.kind = backend;
    }
    if let Some(model) = cli.model {
        config.backend.model = model;
    }

    App::new(config, cli.session_id).run().await
}
