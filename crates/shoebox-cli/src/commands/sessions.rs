//! Sessions command implementation.
//!
//! Pending uploads are stored as one record per file; these commands only
//! read or delete records and never contact the server.

use anyhow::{Context, Result};

use super::{SessionsAction, SessionsArgs};
use crate::ui::format_size;

/// Run the sessions command.
pub async fn run(args: SessionsArgs) -> Result<()> {
    let config = super::load_config()?;
    let store = super::open_store(&config).await?;

    match args.action {
        SessionsAction::List { json } => {
            let sessions = store.list().await.context("Failed to list sessions")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }

            if sessions.is_empty() {
                println!("No pending uploads.");
                return Ok(());
            }

            println!("Pending uploads ({}):", store.dir().display());
            println!();
            for session in &sessions {
                let age = chrono::Utc::now() - session.updated_at;
                println!(
                    "  {:>6.2}%  {} of {}  {}",
                    session.progress_percentage(),
                    format_size(session.confirmed_bytes),
                    format_size(session.total_bytes),
                    session.file_path.display()
                );
                println!(
                    "           {}, last confirmed {} ago",
                    session.mime_type,
                    format_age(age)
                );
            }
        }
        SessionsAction::Clean { all } => {
            let removed = if all {
                store.cleanup_older_than(chrono::Duration::zero()).await
            } else {
                store.cleanup_expired(config.sessions.expire).await
            }
            .context("Failed to clean sessions")?;

            println!("Removed {removed} session record(s).");
        }
    }

    Ok(())
}

fn format_age(age: chrono::Duration) -> String {
    if age.num_days() > 0 {
        format!("{}d", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m", age.num_minutes())
    } else {
        format!("{}s", age.num_seconds().max(0))
    }
}
