//! Error types for Shoebox.
//!
//! This module provides a unified error type for all Shoebox operations,
//! with specific error variants for each way an upload can end early.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` type for Shoebox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Shoebox.
#[derive(Error, Debug)]
pub enum Error {
    /// File failed validation and was never attempted (E101)
    #[error("invalid file '{path}': {reason}")]
    InvalidFile {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Upload session could not be opened (E102)
    #[error("failed to start upload session: {0}")]
    SessionStartFailed(String),

    /// Server no longer recognizes the session handle (E103)
    #[error("upload session expired")]
    SessionExpired,

    /// Server acknowledgment regressed, stalled or overshot (E104)
    #[error("server acknowledged {reported} bytes after a chunk starting at offset {offset}")]
    ChunkMismatch {
        /// Confirmed offset before the chunk was sent
        offset: u64,
        /// Offset the server reported, if it reported one
        reported: u64,
    },

    /// Chunk rejected with an unexpected status (E105)
    #[error("chunk at offset {offset} failed with HTTP {status}")]
    ChunkUploadFailed {
        /// HTTP status returned
        status: u16,
        /// Offset of the rejected chunk
        offset: u64,
    },

    /// Upload end state could not be confirmed (E106)
    #[error("upload incomplete: {0}")]
    UploadIncomplete(String),

    /// Transfer was cancelled
    #[error("transfer cancelled")]
    TransferCancelled,

    /// Operation timeout
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Request never produced a response
    #[error("network error: {0}")]
    Network(String),

    /// Response did not follow the upload protocol
    #[error("invalid protocol response: {0}")]
    ProtocolError(String),

    /// Media item creation failed
    #[error("media item registration failed: {0}")]
    RegistrationFailed(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidFile`].
    pub(crate) fn invalid_file(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidFile { .. } => Some("E101"),
            Self::SessionStartFailed(_) => Some("E102"),
            Self::SessionExpired => Some("E103"),
            Self::ChunkMismatch { .. } => Some("E104"),
            Self::ChunkUploadFailed { .. } => Some("E105"),
            Self::UploadIncomplete(_) => Some("E106"),
            _ => None,
        }
    }

    /// Returns whether this error is a cancellation condition.
    ///
    /// Cancellation and per-chunk deadlines are reported unchanged so callers
    /// can tell "stopped" apart from "broke".
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::TransferCancelled | Self::Timeout(_))
    }

    /// Returns whether running the same upload again continues from the last
    /// server-confirmed offset.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::ChunkUploadFailed { .. }
                | Self::UploadIncomplete(_)
                | Self::TransferCancelled
                | Self::Timeout(_)
                | Self::Network(_)
                | Self::Io(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidFile { .. } => Some(
                "Only photos and videos between 1 byte and 20 GiB can be uploaded.\n\
                 Check that the file is not truncated or mislabelled.",
            ),
            Self::SessionExpired | Self::ChunkMismatch { .. } => Some(
                "The saved upload session was discarded.\n\
                 Run the upload again to start a fresh session.",
            ),
            Self::UploadIncomplete(_)
            | Self::ChunkUploadFailed { .. }
            | Self::Network(_)
            | Self::Timeout(_)
            | Self::TransferCancelled => Some(
                "Progress has been saved. Run the same upload again to resume\n\
                 from the last confirmed byte.",
            ),
            Self::RegistrationFailed(_) => Some(
                "The file was uploaded but could not be added to the library.\n\
                 Check that the access token has the append-only library scope.",
            ),
            _ => None,
        }
    }
}
