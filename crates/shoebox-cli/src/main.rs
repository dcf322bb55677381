//! Shoebox CLI - resumable photo and video uploads
//!
//! Shoebox moves media off a memory card and into a remote photo library.
//! Interrupted uploads pick up where the server left off.
//!
//! ## Quick Start
//!
//! ```bash
//! # Upload a card's worth of photos
//! export SHOEBOX_ACCESS_TOKEN=...
//! shoebox upload /media/card/DCIM/100CANON/*.JPG
//!
//! # See what is still pending
//! shoebox sessions list
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_precision_loss)]

use anyhow::Result;
use clap::Parser;

mod commands;
mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Upload(args) => commands::upload::run(args).await,
        Command::Sessions(args) => commands::sessions::run(args).await,
        Command::Config(args) => commands::config::run(&args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,shoebox=info,shoebox_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
