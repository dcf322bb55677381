//! Authoritative session state from the server.
//!
//! Used when every byte is confirmed but no token has been seen, e.g. the
//! final chunk's reply was lost. A session is only complete when the server
//! says so explicitly.

use crate::error::{Error, Result};

use super::client::{QueryReply, UploadClient};
use super::protocol::STATUS_FINAL;
use super::{RequestGuard, UploadSession};

/// Query the session and return its upload token if it is final.
///
/// # Errors
///
/// Returns [`Error::UploadIncomplete`] unless the server reports a final
/// status together with a non-empty token.
pub async fn query_status(
    client: &UploadClient,
    session: &UploadSession,
    guard: &RequestGuard,
) -> Result<String> {
    let reply = guard.run(client.query(&session.upload_url)).await?;

    tracing::debug!(
        file = %session.file_name(),
        status = reply.status,
        upload_status = reply.upload_status.as_deref().unwrap_or(""),
        "Queried upload session"
    );

    token_from_query(reply)
}

fn token_from_query(reply: QueryReply) -> Result<String> {
    let is_final = reply
        .upload_status
        .as_deref()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case(STATUS_FINAL));
    let token = reply.body.trim();

    if (200..300).contains(&reply.status) && is_final && !token.is_empty() {
        return Ok(token.to_string());
    }

    Err(Error::UploadIncomplete(format!(
        "server reported status '{}' (HTTP {}) {} token",
        reply.upload_status.as_deref().unwrap_or("none"),
        reply.status,
        if token.is_empty() { "without" } else { "with" },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: u16, upload_status: Option<&str>, body: &str) -> QueryReply {
        QueryReply {
            status,
            upload_status: upload_status.map(ToString::to_string),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_final_with_token_completes() {
        assert_eq!(
            token_from_query(reply(200, Some("final"), "tok-1")).unwrap(),
            "tok-1"
        );
    }

    #[test]
    fn test_final_without_token_is_incomplete() {
        assert!(matches!(
            token_from_query(reply(200, Some("final"), "")),
            Err(Error::UploadIncomplete(_))
        ));
    }

    #[test]
    fn test_active_is_incomplete_even_with_body() {
        assert!(matches!(
            token_from_query(reply(200, Some("active"), "tok-1")),
            Err(Error::UploadIncomplete(_))
        ));
        assert!(matches!(
            token_from_query(reply(200, None, "tok-1")),
            Err(Error::UploadIncomplete(_))
        ));
    }

    #[test]
    fn test_error_status_is_incomplete() {
        assert!(matches!(
            token_from_query(reply(500, Some("final"), "tok-1")),
            Err(Error::UploadIncomplete(_))
        ));
    }
}
