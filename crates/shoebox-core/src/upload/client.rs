//! HTTP plumbing for the resumable-upload endpoint.
//!
//! The client only speaks the wire format; deciding what a reply means for
//! the session is left to the initiator, transmitter and status query.

use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::error::{Error, Result};

use super::protocol::{
    self, ChunkReply, COMMAND_QUERY, COMMAND_START, COMMAND_UPLOAD, COMMAND_UPLOAD_FINALIZE,
    HEADER_COMMAND, HEADER_CONTENT_TYPE, HEADER_OFFSET, HEADER_PROTOCOL, HEADER_RAW_SIZE,
    HEADER_STATUS, HEADER_UPLOAD_URL, PROTOCOL_RESUMABLE,
};

/// Reply to a session start request.
#[derive(Debug, Clone)]
pub struct StartReply {
    /// HTTP status
    pub status: u16,
    /// Session handle, when the server sent one
    pub upload_url: Option<String>,
}

/// Reply to a status query.
#[derive(Debug, Clone)]
pub struct QueryReply {
    /// HTTP status
    pub status: u16,
    /// Value of the upload status header
    pub upload_status: Option<String>,
    /// Response body
    pub body: String,
}

/// Client for one resumable-upload endpoint.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: Client,
    endpoint: String,
    access_token: String,
}

impl UploadClient {
    /// Create a client for `endpoint`, authenticating with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        // 308 is a protocol reply here, never a redirect to follow
        let http = Client::builder()
            .redirect(Policy::none())
            .user_agent(concat!("shoebox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        })
    }

    /// Ask the server to open a session for `size` bytes of `mime_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no response arrives.
    pub async fn start(&self, size: u64, mime_type: &str) -> Result<StartReply> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .header(HEADER_PROTOCOL, PROTOCOL_RESUMABLE)
            .header(HEADER_COMMAND, COMMAND_START)
            .header(HEADER_CONTENT_TYPE, mime_type)
            .header(HEADER_RAW_SIZE, size.to_string())
            .body(Vec::new())
            .send()
            .await
            .map_err(|e| Error::Network(format!("session start request failed: {e}")))?;

        let upload_url = header_str(&response, HEADER_UPLOAD_URL)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToString::to_string);

        Ok(StartReply {
            status: response.status().as_u16(),
            upload_url,
        })
    }

    /// Send one chunk starting at `offset`.
    ///
    /// The chunk that reaches `total` is sent with the finalize command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the request or the response body fails.
    pub async fn upload_chunk(
        &self,
        upload_url: &str,
        offset: u64,
        total: u64,
        data: Vec<u8>,
    ) -> Result<ChunkReply> {
        let len = data.len() as u64;
        let command = if offset + len >= total {
            COMMAND_UPLOAD_FINALIZE
        } else {
            COMMAND_UPLOAD
        };

        let response = self
            .http
            .post(upload_url)
            .bearer_auth(&self.access_token)
            .header(HEADER_COMMAND, command)
            .header(HEADER_OFFSET, offset.to_string())
            .header(CONTENT_RANGE, protocol::content_range(offset, len, total))
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Network(format!("chunk at offset {offset} failed: {e}")))?;

        let status = response.status();
        let range = header_str(&response, RANGE.as_str()).map(ToString::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read chunk response: {e}")))?;

        Ok(ChunkReply::classify(status, range.as_deref(), body))
    }

    /// Ask the server for the state of a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the request or the response body fails.
    pub async fn query(&self, upload_url: &str) -> Result<QueryReply> {
        let response = self
            .http
            .post(upload_url)
            .bearer_auth(&self.access_token)
            .header(HEADER_COMMAND, COMMAND_QUERY)
            .body(Vec::new())
            .send()
            .await
            .map_err(|e| Error::Network(format!("status query failed: {e}")))?;

        let status = response.status().as_u16();
        let upload_status = header_str(&response, HEADER_STATUS).map(ToString::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read query response: {e}")))?;

        Ok(QueryReply {
            status,
            upload_status,
            body,
        })
    }
}

fn header_str<'a>(response: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
