//! CLI argument definitions for the `ihos` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// IHOS assistant: tool-routing chat, knowledge search and room booking.
#[derive(Parser, Debug)]
#[command(name = "ihos", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask the assistant a question.
    Ask {
        query: String,
        /// Conversation to record the exchange under.
        #[arg(short = 's', long = "session")]
        session: Option<String>,
        /// Print the full response (tool results and trace) as JSON.
        #[arg(long = "json")]
        json: bool,
    },
    /// Ask a question and print the answer as it streams.
    Stream {
        query: String,
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },
    /// Chunk, embed and index a text file.
    Ingest {
        file: PathBuf,
        /// Document id; defaults to the file name.
        #[arg(long = "doc-id")]
        doc_id: Option<String>,
        #[arg(long = "chunk-size")]
        chunk_size: Option<usize>,
        #[arg(long = "overlap")]
        overlap: Option<usize>,
    },
    /// Search indexed documents.
    Search {
        text: String,
        #[arg(short = 'k')]
        k: Option<usize>,
    },
    /// Show the recorded messages of a session.
    History { session: String },
    /// Insert demo rooms, employees and hospitals.
    Seed,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > IHOS_CONFIG env var > ~/.ihos/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("IHOS_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > IHOS_DATA_DIR env var > config file value.
    pub fn resolve_data_dir(&self, config_dir: &str) -> String {
        if let Some(ref p) = self.data_dir {
            return p.to_string_lossy().to_string();
        }
        match std::env::var("IHOS_DATA_DIR") {
            Ok(dir) if !dir.is_empty() => dir,
            _ => config_dir.to_string(),
        }
    }

    /// Resolve the log filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        match std::env::var("RUST_LOG") {
            Ok(filter) if !filter.is_empty() => filter,
            _ => config_level.to_string(),
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".ihos").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ihos").join("config.toml");
    }
    PathBuf::from("config.toml")
}
