//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::EventKind;

/// ShellSync - tenant lifecycle synchronization over pub/sub
#[derive(Parser)]
#[command(
    name = "ss",
    about = "Encode, decode and simulate tenant lifecycle events",
    version = env!("CARGO_PKG_VERSION"),
    after_help = after_help()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the channel message for an event
    Encode {
        /// Tenant name
        tenant: String,

        /// Event kind (Initialize, Reload)
        kind: EventKind,

        /// JSON settings file carried as the Reload snapshot
        #[arg(short, long)]
        payload: Option<PathBuf>,
    },

    /// Parse a channel message
    Decode {
        /// Raw message text
        raw: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run an in-process cluster and report convergence
    Simulate {
        /// Number of nodes (overrides config)
        #[arg(short, long)]
        nodes: Option<usize>,

        /// Comma-separated tenant names (overrides config)
        #[arg(short, long, value_delimiter = ',')]
        tenants: Option<Vec<String>>,

        /// Keep tenant settings in memory instead of files
        #[arg(long)]
        memory: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Where the binary writes its log
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shellsync")
        .join("logs")
        .join("shellsync.log");
    debug!(?path, "get_log_path: returning path");
    path
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}

/// Output format for decode/simulate
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
