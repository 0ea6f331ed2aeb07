// Command-line and environment configuration. `Cli` is what clap parses;
// `Config` is the validated form the rest of the program uses.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::DEFAULT_BASE_URL;
use crate::documents::DEFAULT_EXTENSIONS;
use crate::error::{RagError, Result};
use crate::poll::PollPolicy;
use crate::rag::{DEFAULT_MODEL, DEFAULT_STORE_NAME};

#[derive(Parser, Debug, Clone)]
#[command(name = "gemini-rag", version, about = "Ask questions about local documents using Gemini File Search")]
pub struct Cli {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Generation model used for answers.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Directory scanned for documents to upload.
    #[arg(long, default_value = "documents")]
    pub documents: PathBuf,

    /// Display name of the store created for this session.
    #[arg(long, default_value = DEFAULT_STORE_NAME)]
    pub store_name: String,

    /// File extensions picked up from the documents directory.
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect::<Vec<String>>()
    )]
    pub extensions: Vec<String>,

    /// First delay between import status checks.
    #[arg(long, default_value_t = 2)]
    pub poll_interval_secs: u64,

    #[arg(long, default_value_t = 16)]
    pub poll_max_interval_secs: u64,

    /// Give up waiting for an import after this long (0 waits forever).
    #[arg(long, default_value_t = 600)]
    pub poll_timeout_secs: u64,

    /// Timeout for a single HTTP request.
    #[arg(long, default_value_t = 300)]
    pub request_timeout_secs: u64,

    /// Metadata filter applied to every query.
    #[arg(long)]
    pub metadata_filter: Option<String>,

    /// Delete the uploaded files and the store before exiting.
    #[arg(long)]
    pub cleanup: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload the documents and answer questions interactively (default).
    Chat,
    /// List remote file search stores.
    Stores,
    /// List remote uploaded files.
    Files,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub documents: PathBuf,
    pub store_name: String,
    pub extensions: Vec<String>,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
    pub metadata_filter: Option<String>,
    pub cleanup: bool,
    pub command: Command,
}

impl TryFrom<Cli> for Config {
    type Error = RagError;

    fn try_from(cli: Cli) -> Result<Self> {
        let api_key = cli
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(RagError::MissingCredential)?;

        let extensions: Vec<String> = cli
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if extensions.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "at least one file extension is required".into(),
            ));
        }
        if cli.poll_interval_secs == 0 {
            return Err(RagError::InvalidConfiguration(
                "poll interval must be at least one second".into(),
            ));
        }

        let poll = PollPolicy::new()
            .with_initial_interval(Duration::from_secs(cli.poll_interval_secs))
            .with_max_interval(Duration::from_secs(
                cli.poll_max_interval_secs.max(cli.poll_interval_secs),
            ))
            .with_timeout(match cli.poll_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            });

        Ok(Config {
            api_key,
            base_url: cli.base_url,
            model: cli.model,
            documents: cli.documents,
            store_name: cli.store_name,
            extensions,
            poll,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
            metadata_filter: cli.metadata_filter.filter(|f| !f.trim().is_empty()),
            cleanup: cli.cleanup,
            command: cli.command.unwrap_or(Command::Chat),
        })
    }
}
