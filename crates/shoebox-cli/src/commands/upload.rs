//! Upload command implementation.
//!
//! Files are uploaded one after another. Ctrl+C aborts the request in flight;
//! the next run resumes every unfinished file from its last confirmed offset.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use shoebox_core::register::MediaRegistrar;
use shoebox_core::upload::{UploadClient, UploadOptions, Uploader};
use shoebox_core::Error;

use super::UploadArgs;
use crate::ui::{display_progress, format_size};

/// What happened to one file.
enum Outcome {
    Uploaded { token: String },
    Registered { token: String, media_item: String },
}

/// Why one file did not finish, with the upload token if the bytes made it.
struct Failure {
    error: Error,
    token: Option<String>,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self { error, token: None }
    }
}

/// Run the upload command.
pub async fn run(args: UploadArgs) -> Result<()> {
    let config = super::load_config()?;
    let store = super::open_store(&config).await?;

    match store.cleanup_expired(config.sessions.expire).await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "Pruned expired session records"),
        Err(e) => tracing::warn!(error = %e, "Failed to prune session records"),
    }

    let client = UploadClient::new(config.remote.upload_endpoint(), args.token.as_str())
        .context("Failed to create upload client")?;
    let registrar = if config.upload.register && !args.no_register {
        Some(
            MediaRegistrar::new(config.remote.batch_create_endpoint(), args.token.as_str())
                .context("Failed to create media registrar")?,
        )
    } else {
        None
    };

    let mut options = UploadOptions::from(&config);
    if let Some(chunk_size) = args.chunk_size {
        options.chunk_size = chunk_size;
    }

    if !args.quiet && !args.json {
        println!("\nShoebox v{}", env!("CARGO_PKG_VERSION"));
        println!("─────────────────────────────────────");
        println!(
            "  {} file(s), {} chunks",
            args.paths.len(),
            format_size(options.chunk_size as u64)
        );
        println!();
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let start_time = Instant::now();
    let mut failed = 0usize;
    let mut total_bytes = 0u64;

    for path in &args.paths {
        if cancel.is_cancelled() {
            break;
        }

        let uploader = Uploader::new(client.clone(), store.clone(), options.clone())
            .with_cancel_token(cancel.clone());

        let progress_handle = if args.quiet || args.json {
            None
        } else {
            Some(tokio::spawn(display_progress(uploader.progress())))
        };

        let result = upload_one(&uploader, registrar.as_ref(), path, &args).await;

        if let Some(handle) = progress_handle {
            let _ = handle.await;
        }

        match result {
            Ok(outcome) => {
                total_bytes += uploader.progress().borrow().total_bytes;
                report_success(path, &outcome, &args);
            }
            Err(failure) => {
                failed += 1;
                report_failure(path, &failure, &args);
                if failure.error.is_cancellation() && cancel.is_cancelled() {
                    break;
                }
            }
        }
    }

    if !args.quiet && !args.json {
        println!(
            "  Sent {} in {}s",
            format_size(total_bytes),
            start_time.elapsed().as_secs()
        );
    }

    if cancel.is_cancelled() {
        anyhow::bail!("Upload interrupted; run the same command again to resume");
    }
    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, args.paths.len());
    }

    Ok(())
}

async fn upload_one(
    uploader: &Uploader,
    registrar: Option<&MediaRegistrar>,
    path: &Path,
    args: &UploadArgs,
) -> Result<Outcome, Failure> {
    let token = uploader.upload(path).await?;

    let Some(registrar) = registrar else {
        return Ok(Outcome::Uploaded { token });
    };

    let file_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let item = match registrar
        .create_media_item(
            &token,
            &file_name,
            args.album.as_deref(),
            args.description.as_deref(),
        )
        .await
    {
        Ok(item) => item,
        Err(error) => {
            return Err(Failure {
                error,
                token: Some(token),
            })
        }
    };

    Ok(Outcome::Registered {
        token,
        media_item: item.id,
    })
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("  Interrupted, aborting the request in flight...");
            cancel.cancel();
        }
    });
}

fn report_success(path: &Path, outcome: &Outcome, args: &UploadArgs) {
    if args.json {
        let line = match outcome {
            Outcome::Uploaded { token } => serde_json::json!({
                "path": path.display().to_string(),
                "upload_token": token,
            }),
            Outcome::Registered { token, media_item } => serde_json::json!({
                "path": path.display().to_string(),
                "upload_token": token,
                "media_item": media_item,
            }),
        };
        println!("{line}");
        return;
    }

    match outcome {
        Outcome::Uploaded { token } if args.quiet => println!("{token}"),
        Outcome::Registered { media_item, .. } if args.quiet => println!("{media_item}"),
        Outcome::Uploaded { token } => {
            println!("  ✓ {} -> upload token {}", path.display(), token);
        }
        Outcome::Registered { media_item, .. } => {
            println!("  ✓ {} -> media item {}", path.display(), media_item);
        }
    }
}

fn report_failure(path: &Path, failure: &Failure, args: &UploadArgs) {
    if args.json {
        println!("{}", failure_line(path, failure));
        return;
    }

    let error = &failure.error;
    let code = error.code().map_or_else(String::new, |c| format!("[{c}] "));
    eprintln!("  ✗ {}: {}{}", path.display(), code, error);
    if let Some(token) = &failure.token {
        eprintln!("    Upload token {token} can still be registered");
    }
    if let Some(suggestion) = error.suggestion() {
        eprintln!("    {suggestion}");
    }
}

fn failure_line(path: &Path, failure: &Failure) -> serde_json::Value {
    let error = &failure.error;
    let mut line = serde_json::json!({
        "path": path.display().to_string(),
        "error": error.to_string(),
        "code": error.code(),
        "resumable": error.is_resumable(),
    });
    if let Some(token) = &failure.token {
        line["upload_token"] = serde_json::Value::from(token.as_str());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_line_keeps_token_after_registration_error() {
        let failure = Failure {
            error: Error::RegistrationFailed("HTTP 403".to_string()),
            token: Some("tok-42".to_string()),
        };
        let line = failure_line(Path::new("/card/IMG_0001.JPG"), &failure);

        assert_eq!(line["path"], "/card/IMG_0001.JPG");
        assert_eq!(line["upload_token"], "tok-42");
        assert_eq!(line["resumable"], false);
        assert!(line["error"].as_str().unwrap().contains("HTTP 403"));
    }

    #[test]
    fn test_failure_line_without_token() {
        let failure = Failure::from(Error::SessionExpired);
        let line = failure_line(Path::new("/card/IMG_0002.JPG"), &failure);

        assert_eq!(line["code"], "E103");
        assert!(line.get("upload_token").is_none());
    }
}
