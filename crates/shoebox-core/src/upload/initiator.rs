//! Opens new upload sessions.

use crate::error::{Error, Result};

use super::client::UploadClient;
use super::store::SessionStore;
use super::validate::ValidatedFile;
use super::{RequestGuard, UploadSession};

/// Open a fresh session for `file` and persist it before returning.
///
/// # Errors
///
/// Returns [`Error::SessionStartFailed`] on a non-success status, a missing
/// session handle or a transport failure. Cancellation and timeout are
/// returned unchanged.
pub async fn start_session(
    client: &UploadClient,
    store: &SessionStore,
    file: &ValidatedFile,
    guard: &RequestGuard,
) -> Result<UploadSession> {
    let size = file.identity.size;

    let reply = match guard.run(client.start(size, &file.mime_type)).await {
        Ok(reply) => reply,
        Err(e) if e.is_cancellation() => return Err(e),
        Err(e) => return Err(Error::SessionStartFailed(e.to_string())),
    };

    if !(200..300).contains(&reply.status) {
        return Err(Error::SessionStartFailed(format!(
            "server answered HTTP {}",
            reply.status
        )));
    }

    let upload_url = reply.upload_url.ok_or_else(|| {
        Error::SessionStartFailed("response carried no upload URL".to_string())
    })?;

    let session = UploadSession::new(&file.identity, upload_url, &file.mime_type);
    store.save(&session).await?;

    tracing::info!(
        file = %file.identity.file_name(),
        size,
        mime_type = %file.mime_type,
        "Opened upload session"
    );

    Ok(session)
}
