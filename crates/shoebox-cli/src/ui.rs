//! UI utilities for Shoebox CLI.

use std::io::{self, Write};
use std::time::Duration;

use tokio::sync::watch;

use shoebox_core::upload::{UploadProgress, UploadState};

/// Format a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Print a progress line until the upload reaches a terminal state.
pub async fn display_progress(mut rx: watch::Receiver<UploadProgress>) {
    let mut last_confirmed = None;

    loop {
        let changed = tokio::time::timeout(Duration::from_secs(1), rx.changed()).await;

        let progress = rx.borrow_and_update().clone();

        match progress.state {
            UploadState::Done | UploadState::Failed => break,
            UploadState::Transferring if last_confirmed != Some(progress.confirmed_bytes) => {
                last_confirmed = Some(progress.confirmed_bytes);
                print!(
                    "\r  [{:>6.2}%] {} - {} of {}    ",
                    progress.percentage(),
                    progress.file_name,
                    format_size(progress.confirmed_bytes),
                    format_size(progress.total_bytes)
                );
                let _ = io::stdout().flush();
            }
            _ => {}
        }

        if matches!(changed, Ok(Err(_))) {
            break;
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
