//! Upload orchestration.
//!
//! [`Uploader`] is the only entry point into the upload machinery. It walks
//! one file through validation, session resolution, the chunk loop and
//! cleanup, publishing every state change and confirmed offset on a watch
//! channel.

use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};

use super::client::UploadClient;
use super::initiator;
use super::status;
use super::store::SessionStore;
use super::transmitter::{ChunkTransmitter, TransferOutcome};
use super::validate::{ValidatedFile, Validator};
use super::{RequestGuard, UploadProgress, UploadSession, UploadState};

/// Tunables for an [`Uploader`].
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Bytes per chunk request
    pub chunk_size: usize,
    /// Deadline for each request
    pub chunk_timeout: Duration,
    /// Size and content checks
    pub validator: Validator,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            chunk_timeout: Duration::from_secs(crate::DEFAULT_CHUNK_TIMEOUT_SECS),
            validator: Validator::default(),
        }
    }
}

impl From<&Config> for UploadOptions {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.upload.chunk_size,
            chunk_timeout: config.upload.chunk_timeout,
            validator: Validator::new(config.upload.min_file_size, config.upload.max_file_size),
        }
    }
}

/// Uploads files to one resumable-upload endpoint.
///
/// Independent uploaders may run concurrently on different files; each
/// file's progress lives in its own session record.
pub struct Uploader {
    client: UploadClient,
    store: SessionStore,
    options: UploadOptions,
    cancel: CancellationToken,
    progress_tx: watch::Sender<UploadProgress>,
}

impl Uploader {
    /// Create an uploader.
    #[must_use]
    pub fn new(client: UploadClient, store: SessionStore, options: UploadOptions) -> Self {
        let (progress_tx, _) = watch::channel(UploadProgress::idle());
        Self {
            client,
            store,
            options,
            cancel: CancellationToken::new(),
            progress_tx,
        }
    }

    /// Use `cancel` to stop uploads instead of the uploader's own token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the in-flight request when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to state changes and confirmed-offset updates.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress_tx.subscribe()
    }

    /// Upload one file and return its upload token.
    ///
    /// Calling this again after a failure resumes from the last offset the
    /// server confirmed, unless the failure discarded the session
    /// ([`Error::SessionExpired`], [`Error::ChunkMismatch`]).
    ///
    /// # Errors
    ///
    /// Returns the specific error that ended the attempt; no partial token is
    /// ever returned.
    pub async fn upload(&self, path: &Path) -> Result<String> {
        let file_name = super::file_name_of(path);
        self.progress_tx.send_replace(UploadProgress {
            file_name,
            ..UploadProgress::idle()
        });

        match self.run(path).await {
            Ok(token) => Ok(token),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    cancelled = e.is_cancellation(),
                    "Upload failed"
                );
                self.transition(UploadState::Failed);
                Err(e)
            }
        }
    }

    async fn run(&self, path: &Path) -> Result<String> {
        self.transition(UploadState::Validating);
        let file = self.options.validator.validate(path).await?;

        self.transition(UploadState::SessionResolving);
        let guard = RequestGuard::new(self.cancel.clone(), self.options.chunk_timeout);
        let mut session = self.resolve_session(&file, &guard).await?;
        self.progress_tx.send_modify(|p| {
            p.confirmed_bytes = session.confirmed_bytes;
            p.total_bytes = session.total_bytes;
        });

        self.transition(UploadState::Transferring);
        let token = match self.transfer(&file, &mut session, &guard).await {
            Ok(token) => token,
            Err(e @ (Error::SessionExpired | Error::ChunkMismatch { .. })) => {
                self.discard(&file).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.transition(UploadState::Finalizing);
        if let Err(e) = self.store.delete(&file.identity).await {
            tracing::warn!(
                file = %file.identity.file_name(),
                error = %e,
                "Failed to delete completed session record"
            );
        }

        self.transition(UploadState::Done);
        Ok(token)
    }

    async fn resolve_session(
        &self,
        file: &ValidatedFile,
        guard: &RequestGuard,
    ) -> Result<UploadSession> {
        if let Some(session) = self.store.load(&file.identity).await {
            tracing::info!(
                file = %file.identity.file_name(),
                confirmed_bytes = session.confirmed_bytes,
                total_bytes = session.total_bytes,
                "Resuming upload session"
            );
            return Ok(session);
        }

        initiator::start_session(&self.client, &self.store, file, guard).await
    }

    async fn transfer(
        &self,
        file: &ValidatedFile,
        session: &mut UploadSession,
        guard: &RequestGuard,
    ) -> Result<String> {
        let mut handle = File::open(&file.identity.path).await?;

        let transmitter = ChunkTransmitter::new(
            &self.client,
            &self.store,
            guard,
            self.options.chunk_size,
            &self.progress_tx,
        );

        match transmitter.run(&mut handle, session).await? {
            TransferOutcome::Token(token) => Ok(token),
            TransferOutcome::Unconfirmed => {
                tracing::info!(
                    file = %session.file_name(),
                    "All bytes confirmed without a token, querying session"
                );
                status::query_status(&self.client, session, guard).await
            }
        }
    }

    async fn discard(&self, file: &ValidatedFile) {
        if let Err(e) = self.store.delete(&file.identity).await {
            tracing::warn!(
                file = %file.identity.file_name(),
                error = %e,
                "Failed to discard session record"
            );
        } else {
            tracing::info!(
                file = %file.identity.file_name(),
                "Discarded session record, next attempt starts over"
            );
        }
    }

    fn transition(&self, state: UploadState) {
        self.progress_tx.send_modify(|p| p.state = state);
        tracing::info!(state = %state, "Upload state changed");
    }
}
