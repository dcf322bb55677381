//! Resumable chunked-upload client.
//!
//! This module moves one media file to the remote resumable-upload endpoint
//! and produces the opaque upload token that media-item creation consumes.
//!
//! ## Upload Flow
//!
//! ```text
//! Validating ──► SessionResolving ──► Transferring ──► Finalizing ──► Done
//!     │               │                    │               │
//!     └───────────────┴──────► Failed ◄────┴───────────────┘
//! ```
//!
//! 1. The [`Validator`] size-checks and content-sniffs the file
//! 2. The [`SessionStore`] returns a resumable session, or the initiator
//!    opens a new one
//! 3. The transmitter sends chunks strictly in order, persisting every
//!    server-confirmed offset
//! 4. The record is deleted once the token is in hand
//!
//! Persisted progress is the retry mechanism: running the same upload again
//! after a failure continues from the last offset the server confirmed.

pub mod client;
pub mod initiator;
pub mod orchestrator;
pub mod protocol;
pub mod status;
pub mod store;
pub mod transmitter;
pub mod validate;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub use client::UploadClient;
pub use orchestrator::{UploadOptions, Uploader};
pub use store::SessionStore;
pub use validate::{MediaCategory, ValidatedFile, Validator};

/// Identity of a file on disk, used to find its session record.
///
/// The lookup key depends on the canonical path only. Size and prefix
/// fingerprint are compared against the record so that a file that changed
/// on disk never resumes someone else's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    /// Canonical absolute path
    pub path: PathBuf,
    /// Current size in bytes
    pub size: u64,
    /// xxh3-64 of the first bytes of the file
    pub fingerprint: u64,
}

impl FileIdentity {
    /// Lookup key for this file's session record.
    #[must_use]
    pub fn key(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(self.path.as_os_str().as_encoded_bytes())
    }

    /// Base name of the file, lossily converted.
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

/// Persisted progress of one resumable upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Canonical path of the source file
    pub file_path: PathBuf,
    /// Server-issued session handle
    pub upload_url: String,
    /// Bytes the server has acknowledged
    pub confirmed_bytes: u64,
    /// File size at session creation
    pub total_bytes: u64,
    /// Content type declared at session start
    pub mime_type: String,
    /// Prefix fingerprint at session creation
    pub fingerprint: u64,
    /// When the session was opened
    pub created_at: DateTime<Utc>,
    /// When the record was last written
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Create a fresh session with nothing confirmed.
    #[must_use]
    pub fn new(identity: &FileIdentity, upload_url: impl Into<String>, mime_type: &str) -> Self {
        let now = Utc::now();
        Self {
            file_path: identity.path.clone(),
            upload_url: upload_url.into(),
            confirmed_bytes: 0,
            total_bytes: identity.size,
            mime_type: mime_type.to_string(),
            fingerprint: identity.fingerprint,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record may be resumed for the file as it is now.
    #[must_use]
    pub fn matches(&self, identity: &FileIdentity) -> bool {
        self.file_path == identity.path
            && self.total_bytes == identity.size
            && self.fingerprint == identity.fingerprint
    }

    /// Record a server acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChunkMismatch`] if `reported` does not advance the
    /// confirmed offset or runs past the end of the file.
    pub fn confirm(&mut self, reported: u64) -> Result<()> {
        if reported <= self.confirmed_bytes || reported > self.total_bytes {
            return Err(Error::ChunkMismatch {
                offset: self.confirmed_bytes,
                reported,
            });
        }
        self.confirmed_bytes = reported;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Bytes still to be confirmed.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.total_bytes.saturating_sub(self.confirmed_bytes)
    }

    /// Whether every byte has been confirmed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.confirmed_bytes >= self.total_bytes
    }

    /// Percentage of the file the server has confirmed.
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.confirmed_bytes as f64 / self.total_bytes as f64) * 100.0
    }

    /// Base name of the source file.
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name_of(&self.file_path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Probing the file
    Validating,
    /// Loading or opening a session
    SessionResolving,
    /// Sending chunks
    Transferring,
    /// Cleaning up after the token arrived
    Finalizing,
    /// Token obtained
    Done,
    /// Ended with an error
    Failed,
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::SessionResolving => "resolving session",
            Self::Transferring => "transferring",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot published to progress observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    /// Current orchestrator state
    pub state: UploadState,
    /// File being uploaded
    pub file_name: String,
    /// Bytes the server has confirmed
    pub confirmed_bytes: u64,
    /// Total bytes in the file
    pub total_bytes: u64,
}

impl UploadProgress {
    pub(crate) fn idle() -> Self {
        Self {
            state: UploadState::Validating,
            file_name: String::new(),
            confirmed_bytes: 0,
            total_bytes: 0,
        }
    }

    /// Confirmed share of the file, 0.0 to 100.0.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.confirmed_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Bounds a single request by a deadline and a cancellation token.
#[derive(Debug, Clone)]
pub struct RequestGuard {
    cancel: CancellationToken,
    deadline: Duration,
}

impl RequestGuard {
    /// Create a guard.
    #[must_use]
    pub fn new(cancel: CancellationToken, deadline: Duration) -> Self {
        Self { cancel, deadline }
    }

    /// Drive `fut` until it finishes, the deadline passes or the token fires.
    ///
    /// The in-flight future is dropped on cancellation or timeout, aborting
    /// the request.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::TransferCancelled),
            res = tokio::time::timeout(self.deadline, fut) => {
                res.map_err(|_| Error::Timeout(self.deadline))?
            }
        }
    }
}
