//! Resumable-upload wire protocol.
//!
//! Header names, command values and the interpretation of server replies.
//! Everything here is pure so the transmitter's decisions can be tested
//! without a network.

use reqwest::StatusCode;

use crate::error::{Error, Result};

/// Selects the resumable protocol on session start.
pub const HEADER_PROTOCOL: &str = "X-Goog-Upload-Protocol";
/// Command carried by every request.
pub const HEADER_COMMAND: &str = "X-Goog-Upload-Command";
/// Content type declared on session start.
pub const HEADER_CONTENT_TYPE: &str = "X-Goog-Upload-Content-Type";
/// Total file size declared on session start.
pub const HEADER_RAW_SIZE: &str = "X-Goog-Upload-Raw-Size";
/// Session handle returned on session start.
pub const HEADER_UPLOAD_URL: &str = "X-Goog-Upload-URL";
/// Byte offset of a chunk.
pub const HEADER_OFFSET: &str = "X-Goog-Upload-Offset";
/// Session status returned by a query.
pub const HEADER_STATUS: &str = "X-Goog-Upload-Status";

/// Value of [`HEADER_PROTOCOL`].
pub const PROTOCOL_RESUMABLE: &str = "resumable";
/// Opens a session.
pub const COMMAND_START: &str = "start";
/// Sends a chunk.
pub const COMMAND_UPLOAD: &str = "upload";
/// Sends the chunk that completes the file.
pub const COMMAND_UPLOAD_FINALIZE: &str = "upload, finalize";
/// Asks for the session state.
pub const COMMAND_QUERY: &str = "query";
/// [`HEADER_STATUS`] value of a completed session.
pub const STATUS_FINAL: &str = "final";

/// How the server answered a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkReply {
    /// More bytes expected; the server holds `confirmed` bytes.
    Continue {
        /// One past the last byte the server holds, if it said
        confirmed: Option<u64>,
    },
    /// Upload finished; the body is the upload token.
    Final {
        /// Response body
        body: String,
    },
    /// The session handle is no longer valid.
    Expired,
    /// Any other status.
    Failed {
        /// HTTP status
        status: u16,
    },
}

impl ChunkReply {
    /// Classify a chunk response.
    #[must_use]
    pub fn classify(status: StatusCode, range: Option<&str>, body: String) -> Self {
        match status {
            StatusCode::PERMANENT_REDIRECT => Self::Continue {
                confirmed: range.and_then(parse_confirmed_range),
            },
            StatusCode::OK | StatusCode::CREATED => Self::Final { body },
            StatusCode::NOT_FOUND => Self::Expired,
            other => Self::Failed {
                status: other.as_u16(),
            },
        }
    }
}

/// Parse a `Range: bytes=0-N` header into the confirmed byte count `N + 1`.
///
/// Returns `None` for anything that does not start at byte zero.
#[must_use]
pub fn parse_confirmed_range(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    if start.trim().parse::<u64>().ok()? != 0 {
        return None;
    }
    end.trim().parse::<u64>().ok()?.checked_add(1)
}

/// `Content-Range` value for a chunk of `len` bytes at `offset`.
#[must_use]
pub fn content_range(offset: u64, len: u64, total: u64) -> String {
    format!("bytes {offset}-{}/{total}", offset + len - 1)
}

/// Extract the upload token from a final reply.
///
/// # Errors
///
/// Returns [`Error::ProtocolError`] if the body is blank.
pub fn upload_token(body: &str) -> Result<String> {
    let token = body.trim();
    if token.is_empty() {
        return Err(Error::ProtocolError(
            "final response carried an empty upload token".to_string(),
        ));
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confirmed_range() {
        assert_eq!(parse_confirmed_range("bytes=0-9999999"), Some(10_000_000));
        assert_eq!(parse_confirmed_range("bytes=0-0"), Some(1));
        assert_eq!(parse_confirmed_range(" bytes=0-1023 "), Some(1024));
    }

    #[test]
    fn test_parse_confirmed_range_rejects_garbage() {
        assert_eq!(parse_confirmed_range(""), None);
        assert_eq!(parse_confirmed_range("bytes=0-"), None);
        assert_eq!(parse_confirmed_range("bytes=10-20"), None);
        assert_eq!(parse_confirmed_range("0-20"), None);
        assert_eq!(parse_confirmed_range("bytes=0-abc"), None);
    }

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(0, 1024, 2560), "bytes 0-1023/2560");
        assert_eq!(content_range(2048, 512, 2560), "bytes 2048-2559/2560");
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            ChunkReply::classify(
                StatusCode::PERMANENT_REDIRECT,
                Some("bytes=0-99"),
                String::new()
            ),
            ChunkReply::Continue {
                confirmed: Some(100)
            }
        );
        assert_eq!(
            ChunkReply::classify(StatusCode::PERMANENT_REDIRECT, None, String::new()),
            ChunkReply::Continue { confirmed: None }
        );
        assert_eq!(
            ChunkReply::classify(StatusCode::CREATED, None, "tok".into()),
            ChunkReply::Final { body: "tok".into() }
        );
        assert_eq!(
            ChunkReply::classify(StatusCode::NOT_FOUND, None, String::new()),
            ChunkReply::Expired
        );
        assert_eq!(
            ChunkReply::classify(StatusCode::SERVICE_UNAVAILABLE, None, String::new()),
            ChunkReply::Failed { status: 503 }
        );
    }

    #[test]
    fn test_upload_token() {
        assert_eq!(upload_token("abc").unwrap(), "abc");
        assert_eq!(upload_token("abc\n").unwrap(), "abc");
        assert!(matches!(
            upload_token("  "),
            Err(Error::ProtocolError(_))
        ));
    }
}
