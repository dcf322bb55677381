//! The chunk loop.
//!
//! Chunks go out strictly in order: each one starts where the server's last
//! acknowledgment left off, which may be short of what was sent. Only
//! acknowledged offsets are ever recorded.

use std::io::SeekFrom;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;

use crate::error::{Error, Result};

use super::client::UploadClient;
use super::protocol::{self, ChunkReply};
use super::store::SessionStore;
use super::{RequestGuard, UploadProgress, UploadSession};

/// How the chunk loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The server finished the upload and returned this token.
    Token(String),
    /// Every byte is confirmed but no token was returned, either because
    /// the last acknowledgment covered the whole file or because the final
    /// reply was blank.
    Unconfirmed,
}

/// Sends a file's unconfirmed bytes, one chunk per request.
pub struct ChunkTransmitter<'a> {
    client: &'a UploadClient,
    store: &'a SessionStore,
    guard: &'a RequestGuard,
    chunk_size: usize,
    progress: &'a watch::Sender<UploadProgress>,
}

impl<'a> ChunkTransmitter<'a> {
    /// Create a transmitter.
    #[must_use]
    pub fn new(
        client: &'a UploadClient,
        store: &'a SessionStore,
        guard: &'a RequestGuard,
        chunk_size: usize,
        progress: &'a watch::Sender<UploadProgress>,
    ) -> Self {
        Self {
            client,
            store,
            guard,
            chunk_size: chunk_size.max(1),
            progress,
        }
    }

    /// Drive the loop until the server returns a token or every byte is
    /// confirmed.
    ///
    /// `session` is updated and persisted after each acknowledgment; on error
    /// it still holds the last persisted offset.
    ///
    /// # Errors
    ///
    /// Returns the terminal error of the first chunk that fails.
    pub async fn run(&self, file: &mut File, session: &mut UploadSession) -> Result<TransferOutcome> {
        while session.confirmed_bytes < session.total_bytes {
            let offset = session.confirmed_bytes;
            let len = (self.chunk_size as u64).min(session.total_bytes - offset);

            let data = read_chunk(file, offset, len).await.map_err(|e| match e {
                Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                    Error::invalid_file(&session.file_path, "file shrank during upload")
                }
                other => other,
            })?;

            tracing::debug!(
                file = %session.file_name(),
                offset,
                len,
                total = session.total_bytes,
                "Sending chunk"
            );

            let reply = self
                .guard
                .run(
                    self.client
                        .upload_chunk(&session.upload_url, offset, session.total_bytes, data),
                )
                .await?;

            match reply {
                ChunkReply::Continue { confirmed } => {
                    let reported = confirmed.ok_or(Error::ChunkMismatch {
                        offset,
                        reported: 0,
                    })?;
                    session.confirm(reported)?;
                    self.store.save(session).await?;

                    if reported < offset + len {
                        tracing::info!(
                            file = %session.file_name(),
                            sent_to = offset + len,
                            confirmed = reported,
                            "Server confirmed a partial chunk, resending the tail"
                        );
                    } else {
                        tracing::debug!(
                            file = %session.file_name(),
                            confirmed = reported,
                            "Chunk confirmed"
                        );
                    }
                    self.publish(session);
                }
                ChunkReply::Final { body } => match protocol::upload_token(&body) {
                    Ok(token) => {
                        session.confirmed_bytes = session.total_bytes;
                        self.publish(session);
                        return Ok(TransferOutcome::Token(token));
                    }
                    Err(e) => {
                        // the server took every byte; only the token is missing
                        tracing::warn!(
                            file = %session.file_name(),
                            error = %e,
                            "Final reply carried no token"
                        );
                        session.confirm(session.total_bytes)?;
                        self.store.save(session).await?;
                        self.publish(session);
                        return Ok(TransferOutcome::Unconfirmed);
                    }
                },
                ChunkReply::Expired => return Err(Error::SessionExpired),
                ChunkReply::Failed { status } => {
                    return Err(Error::ChunkUploadFailed { status, offset });
                }
            }
        }

        Ok(TransferOutcome::Unconfirmed)
    }

    fn publish(&self, session: &UploadSession) {
        self.progress.send_modify(|p| {
            p.confirmed_bytes = session.confirmed_bytes;
            p.total_bytes = session.total_bytes;
        });
    }
}

/// Read exactly `len` bytes at `offset`.
async fn read_chunk(file: &mut File, offset: u64, len: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).await?;

    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_chunk_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        std::fs::write(&path, &content).unwrap();

        let mut file = File::open(&path).await.unwrap();
        let chunk = read_chunk(&mut file, 1000, 500).await.unwrap();
        assert_eq!(chunk, &content[1000..1500]);

        // re-reading an earlier range after a partial acknowledgment
        let chunk = read_chunk(&mut file, 900, 100).await.unwrap();
        assert_eq!(chunk, &content[900..1000]);
    }

    #[tokio::test]
    async fn test_read_chunk_past_end_is_eof() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [1u8; 100]).unwrap();

        let mut file = File::open(&path).await.unwrap();
        let err = read_chunk(&mut file, 50, 100).await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }
}
