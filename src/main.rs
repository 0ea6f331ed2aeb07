// Entrypoint for the CLI application.
// - Loads `.env`, sets up logging and parses the configuration.
// - Builds the API client and session, then dispatches on the subcommand.

use anyhow::Context;
use clap::Parser;
use gemini_rag_cli::config::{Cli, Command, Config};
use gemini_rag_cli::{ui, GeminiClient, RagSession};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::try_from(Cli::parse()).context("Invalid configuration")?;
    let api = GeminiClient::new(&config.api_key, &config.base_url, config.request_timeout)?;
    let mut session = RagSession::new(api)
        .with_model(config.model.clone())
        .with_poll_policy(config.poll.clone())
        .with_metadata_filter(config.metadata_filter.clone());
    info!(model = session.model(), "initialized");

    match config.command {
        Command::Stores => ui::print_stores(&session.list_stores()),
        Command::Files => ui::print_files(&session.list_files()),
        Command::Chat => {
            let outcome = ui::run_chat(&mut session, &config);
            if config.cleanup {
                cleanup(&mut session);
            }
            outcome?;
        }
    }
    Ok(())
}

fn cleanup(session: &mut RagSession<GeminiClient>) {
    session.delete_files();
    if let Err(e) = session.delete_store() {
        warn!(error = %e, "error deleting store");
    }
}
