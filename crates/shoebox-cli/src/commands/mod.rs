//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use anyhow::Context;
use shoebox_core::config::Config;
use shoebox_core::upload::SessionStore;

pub mod config;
pub mod sessions;
pub mod upload;

/// Load configuration.
///
/// A missing file yields the defaults; a file that exists but does not
/// parse or validate is an error.
pub fn load_config() -> anyhow::Result<Config> {
    Config::load().context("Failed to load configuration")
}

/// Open the session store named by the configuration.
pub async fn open_store(config: &Config) -> anyhow::Result<SessionStore> {
    let dir = config
        .sessions
        .dir
        .clone()
        .unwrap_or_else(SessionStore::default_session_dir);

    SessionStore::with_dir(dir)
        .await
        .context("Failed to open session store")
}

/// Shoebox - resumable photo and video uploads
#[derive(Parser)]
#[command(name = "shoebox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Upload photos and videos, resuming interrupted uploads
    Upload(UploadArgs),

    /// Inspect or prune pending upload sessions
    Sessions(SessionsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the upload command
#[derive(Parser)]
pub struct UploadArgs {
    /// Files to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// OAuth access token for the photo library
    #[arg(long, env = "SHOEBOX_ACCESS_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Add created media items to this album
    #[arg(long)]
    pub album: Option<String>,

    /// Description attached to every created media item
    #[arg(long)]
    pub description: Option<String>,

    /// Print upload tokens instead of creating media items
    #[arg(long)]
    pub no_register: bool,

    /// Override the configured chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output results as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the sessions command
#[derive(Parser)]
pub struct SessionsArgs {
    /// Sessions subcommand
    #[command(subcommand)]
    pub action: SessionsAction,
}

/// Sessions subcommands
#[derive(Subcommand)]
pub enum SessionsAction {
    /// List pending sessions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove stale session records
    Clean {
        /// Remove every record, not only expired ones
        #[arg(long)]
        all: bool,
    },
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
