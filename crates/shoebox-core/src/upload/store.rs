//! Session record persistence for interrupted uploads.
//!
//! This module saves and loads [`UploadSession`] records so that an upload
//! can continue from the last server-confirmed offset after a restart.
//!
//! Stale or unreadable records are never surfaced as errors: a fresh session
//! is always a safe fallback, so `load` simply reports "not found".

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

use super::{FileIdentity, UploadSession};

/// File extension for session records.
pub const SESSION_FILE_EXTENSION: &str = ".shoebox-session";

/// Extension of a record that is still being written.
const TEMP_FILE_EXTENSION: &str = ".tmp";

/// Longest base-name prefix kept in a record file name.
const MAX_NAME_PREFIX: usize = 48;

/// Stores one record per in-flight upload.
///
/// Records are stored in platform-specific directories:
/// - Linux: `~/.local/share/shoebox/sessions/`
/// - macOS: `~/Library/Application Support/com.shoebox.Shoebox/sessions/`
/// - Windows: `%APPDATA%\Shoebox\Shoebox\data\sessions\`
#[derive(Debug, Clone)]
pub struct SessionStore {
    /// Directory where records are stored.
    session_dir: PathBuf,
}

impl SessionStore {
    /// Create a store in the default platform-specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new() -> Result<Self> {
        Self::with_dir(Self::default_session_dir()).await
    }

    /// Create a store in a custom directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn with_dir(session_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&session_dir).await.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "Failed to create session directory: {e}"
            )))
        })?;

        Ok(Self { session_dir })
    }

    /// Get the default platform-specific session directory.
    #[must_use]
    pub fn default_session_dir() -> PathBuf {
        let data_dir = directories::ProjectDirs::from("com", "shoebox", "Shoebox").map_or_else(
            || PathBuf::from(".shoebox"),
            |dirs| dirs.data_dir().to_path_buf(),
        );

        data_dir.join("sessions")
    }

    /// Record path for a file: sanitized base name plus the path hash.
    fn record_path(&self, identity: &FileIdentity) -> PathBuf {
        let name: String = identity
            .file_name()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .take(MAX_NAME_PREFIX)
            .collect();

        self.session_dir.join(format!(
            "{name}-{:016x}{SESSION_FILE_EXTENSION}",
            identity.key()
        ))
    }

    /// Save a session record, replacing any previous one.
    ///
    /// The record is written to a temporary file, synced and renamed into
    /// place, so a crash leaves either the old or the new record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub async fn save(&self, session: &UploadSession) -> Result<()> {
        let identity = FileIdentity {
            path: session.file_path.clone(),
            size: session.total_bytes,
            fingerprint: session.fingerprint,
        };
        let path = self.record_path(&identity);

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| Error::Serialization(format!("Failed to serialize session: {e}")))?;

        let temp_path = path.with_extension(&TEMP_FILE_EXTENSION[1..]);

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;

        tracing::debug!(
            path = %path.display(),
            confirmed_bytes = session.confirmed_bytes,
            total_bytes = session.total_bytes,
            "Saved session record"
        );

        Ok(())
    }

    /// Load the session record for a file, if one can be resumed.
    ///
    /// Returns `None` when there is no record, when it cannot be read or
    /// parsed, or when it belongs to a different version of the file.
    /// Unusable records are removed.
    pub async fn load(&self, identity: &FileIdentity) -> Option<UploadSession> {
        let path = self.record_path(identity);

        let session = match Self::read_record(&path).await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Discarding unreadable session record"
                );
                self.remove_quietly(&path).await;
                return None;
            }
        };

        if session.confirmed_bytes > session.total_bytes || session.upload_url.is_empty() {
            tracing::warn!(path = %path.display(), "Discarding inconsistent session record");
            self.remove_quietly(&path).await;
            return None;
        }

        if !session.matches(identity) {
            tracing::info!(
                path = %path.display(),
                recorded_size = session.total_bytes,
                current_size = identity.size,
                "File changed since session was opened, starting over"
            );
            self.remove_quietly(&path).await;
            return None;
        }

        tracing::debug!(
            path = %path.display(),
            confirmed_bytes = session.confirmed_bytes,
            "Loaded session record"
        );

        Some(session)
    }

    async fn read_record(path: &Path) -> Result<Option<UploadSession>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("Failed to parse session record: {e}")))
    }

    async fn remove_quietly(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove session record");
            }
        }
    }

    /// Delete the session record for a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be deleted.
    pub async fn delete(&self, identity: &FileIdentity) -> Result<()> {
        let path = self.record_path(identity);

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Deleted session record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List all readable session records, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<UploadSession>> {
        let mut sessions = Vec::new();

        for path in self.record_files().await? {
            if let Ok(Some(session)) = Self::read_record(&path).await {
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(sessions)
    }

    /// Remove records not updated within `expiry`.
    ///
    /// Remote sessions are abandoned by the server after about a week, so
    /// older records can never be resumed.
    ///
    /// # Returns
    ///
    /// The number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn cleanup_expired(&self, expiry: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(expiry)
            .map_err(|e| Error::Internal(format!("expiry out of range: {e}")))?;
        self.cleanup_older_than(max_age).await
    }

    /// Remove records older than the specified age; unreadable records and
    /// stale half-written records are removed as well.
    ///
    /// # Returns
    ///
    /// The number of files removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn cleanup_older_than(&self, max_age: chrono::Duration) -> Result<usize> {
        let cutoff = chrono::Utc::now() - max_age;
        let mut cleaned = 0;

        for path in self.record_files().await? {
            let expired = match Self::read_record(&path).await {
                Ok(Some(session)) => session.updated_at < cutoff,
                Ok(None) => false,
                Err(_) => true,
            };

            if !expired {
                continue;
            }

            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to delete expired session record"
                );
            } else {
                tracing::debug!(path = %path.display(), "Cleaned up expired session record");
                cleaned += 1;
            }
        }

        // leftovers of saves that never reached the rename
        for path in self.files_with_suffix(TEMP_FILE_EXTENSION).await? {
            let modified = match fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => chrono::DateTime::<chrono::Utc>::from(modified),
                Err(_) => continue,
            };
            if modified >= cutoff {
                continue;
            }

            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to delete interrupted session write"
                );
            } else {
                tracing::debug!(path = %path.display(), "Cleaned up interrupted session write");
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            tracing::info!(count = cleaned, "Cleaned up expired session records");
        }

        Ok(cleaned)
    }

    async fn record_files(&self) -> Result<Vec<PathBuf>> {
        self.files_with_suffix(SESSION_FILE_EXTENSION).await
    }

    async fn files_with_suffix(&self, suffix: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.session_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if filename.ends_with(suffix) {
                files.push(path);
            }
        }

        Ok(files)
    }

    /// Get the session directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.session_dir
    }
}
