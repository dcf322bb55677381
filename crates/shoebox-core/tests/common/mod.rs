//! Common test utilities for `Shoebox` integration tests.
//!
//! Provides temp-file helpers and [`MockUploadServer`], a local stand-in for
//! the resumable-upload endpoint that can be scripted to misbehave.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

use shoebox_core::upload::{SessionStore, UploadClient, UploadOptions, Uploader, Validator};

/// Bearer token the mock expects.
pub const ACCESS_TOKEN: &str = "test-access-token";

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &FsPath, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Random bytes behind a JPEG signature, `size` bytes in total.
pub fn jpeg_bytes(size: usize) -> Vec<u8> {
    let mut bytes = random_bytes(size);
    bytes[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    bytes
}

/// A JPEG-looking file of `size` bytes.
pub fn create_jpeg(dir: &FsPath, name: &str, size: usize) -> (PathBuf, Vec<u8>) {
    let content = jpeg_bytes(size);
    let path = create_test_file(dir, name, &content);
    (path, content)
}

/// How the mock answers one chunk request.
#[derive(Debug, Clone)]
pub enum ChunkOverride {
    /// Keep only the first `n` bytes of the session and acknowledge those.
    PartialAck(u64),
    /// Acknowledge `n` bytes without touching stored data.
    RawAck(u64),
    /// 308 without a Range header.
    AckWithoutRange,
    /// Store the chunk, acknowledge everything, but send no token.
    AckAllWithoutToken,
    /// Finish the session normally but answer 200 with an empty body.
    FinalWithoutBody,
    /// Answer with this status and store nothing.
    Status(u16),
    /// Wait before handling the chunk normally.
    Delay(Duration),
}

/// One request seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Session id, `None` for session start
    pub session: Option<String>,
    /// Upload command header
    pub command: String,
    /// Upload offset header
    pub offset: Option<u64>,
    /// Content-Range header
    pub content_range: Option<String>,
    /// Declared raw size on start
    pub raw_size: Option<u64>,
    /// Declared content type on start
    pub content_type: Option<String>,
    /// Authorization header
    pub authorization: Option<String>,
    /// Body length
    pub len: usize,
}

#[derive(Debug, Default)]
struct MockSession {
    total: u64,
    data: Vec<u8>,
    finalized: bool,
}

#[derive(Default)]
struct MockInner {
    next_id: u32,
    sessions: HashMap<String, MockSession>,
    requests: Vec<RecordedRequest>,
    chunk_count: usize,
    overrides: HashMap<usize, ChunkOverride>,
    start_status: Option<u16>,
    query_active: bool,
    registered: Vec<serde_json::Value>,
}

struct MockState {
    base_url: String,
    inner: Mutex<MockInner>,
}

/// Local resumable-upload server.
pub struct MockUploadServer {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockUploadServer {
    /// Start the server on an ephemeral port.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to read local addr");

        let state = Arc::new(MockState {
            base_url: format!("http://{addr}"),
            inner: Mutex::new(MockInner::default()),
        });

        let app = Router::new()
            .route("/v1/uploads", post(start_session))
            .route("/v1/sessions/{id}", post(session_command))
            .route("/v1/mediaItems:batchCreate", post(batch_create))
            .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock server failed");
        });

        Self { addr, state }
    }

    /// API base of the mock.
    pub fn api_base(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Session start endpoint.
    pub fn upload_endpoint(&self) -> String {
        format!("{}/uploads", self.api_base())
    }

    /// Media-item creation endpoint.
    pub fn batch_create_endpoint(&self) -> String {
        format!("{}/mediaItems:batchCreate", self.api_base())
    }

    /// Client configured for this server.
    pub fn client(&self) -> UploadClient {
        UploadClient::new(self.upload_endpoint(), ACCESS_TOKEN).expect("Failed to build client")
    }

    /// Answer the `index`-th chunk request (zero-based, counted across
    /// sessions) with `reply`.
    pub fn script(&self, index: usize, reply: ChunkOverride) {
        self.lock().overrides.insert(index, reply);
    }

    /// Answer session start with `status` and no handle.
    pub fn fail_start(&self, status: u16) {
        self.lock().start_status = Some(status);
    }

    /// Report finished sessions as still active on query.
    pub fn query_reports_active(&self) {
        self.lock().query_active = true;
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Chunk requests seen so far.
    pub fn chunk_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.command.starts_with("upload"))
            .collect()
    }

    /// Number of sessions opened.
    pub fn sessions_started(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.command == "start")
            .count()
    }

    /// Bytes the server holds for the session handed out at `token`.
    pub fn received_for_token(&self, token: &str) -> Option<Vec<u8>> {
        let id = token.strip_prefix("token-")?;
        self.lock().sessions.get(id).map(|s| s.data.clone())
    }

    /// Bodies of media-item creation requests.
    pub fn registrations(&self) -> Vec<serde_json::Value> {
        self.lock().registered.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.state.inner.lock().expect("Mock state poisoned")
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_string(headers, name).and_then(|v| v.trim().parse().ok())
}

fn record(session: Option<String>, headers: &HeaderMap, len: usize) -> RecordedRequest {
    RecordedRequest {
        session,
        command: header_string(headers, "x-goog-upload-command").unwrap_or_default(),
        offset: header_u64(headers, "x-goog-upload-offset"),
        content_range: header_string(headers, "content-range"),
        raw_size: header_u64(headers, "x-goog-upload-raw-size"),
        content_type: header_string(headers, "x-goog-upload-content-type"),
        authorization: header_string(headers, "authorization"),
        len,
    }
}

fn ack(confirmed: u64) -> Response {
    let mut response = StatusCode::PERMANENT_REDIRECT.into_response();
    if confirmed > 0 {
        let range = format!("bytes=0-{}", confirmed - 1);
        if let Ok(value) = range.parse() {
            response.headers_mut().insert(header::RANGE, value);
        }
    }
    response
}

async fn start_session(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let mut inner = state.inner.lock().expect("Mock state poisoned");
    let request = record(None, &headers, 0);
    let total = request.raw_size.unwrap_or(0);
    inner.requests.push(request);

    if let Some(status) = inner.start_status {
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }

    inner.next_id += 1;
    let id = format!("s{}", inner.next_id);
    inner.sessions.insert(
        id.clone(),
        MockSession {
            total,
            ..MockSession::default()
        },
    );

    let url = format!("{}/v1/sessions/{id}", state.base_url);
    (StatusCode::OK, [("x-goog-upload-url", url)]).into_response()
}

async fn session_command(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = record(Some(id.clone()), &headers, body.len());

    if request.command == "query" {
        let mut inner = state.inner.lock().expect("Mock state poisoned");
        inner.requests.push(request);
        let query_active = inner.query_active;
        return match inner.sessions.get(&id) {
            Some(session) if session.finalized && !query_active => (
                StatusCode::OK,
                [("x-goog-upload-status", "final")],
                format!("token-{id}"),
            )
                .into_response(),
            Some(_) => (StatusCode::OK, [("x-goog-upload-status", "active")]).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }

    let scripted = {
        let mut inner = state.inner.lock().expect("Mock state poisoned");
        let index = inner.chunk_count;
        inner.chunk_count += 1;
        inner.requests.push(request.clone());
        inner.overrides.remove(&index)
    };

    if let Some(ChunkOverride::Delay(delay)) = scripted {
        tokio::time::sleep(delay).await;
    }

    let mut inner = state.inner.lock().expect("Mock state poisoned");
    let Some(session) = inner.sessions.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match scripted {
        Some(ChunkOverride::Status(status)) => {
            return StatusCode::from_u16(status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
        Some(ChunkOverride::RawAck(n)) => return ack(n),
        Some(ChunkOverride::AckWithoutRange) => return StatusCode::PERMANENT_REDIRECT.into_response(),
        _ => {}
    }

    let offset = request.offset.unwrap_or(u64::MAX);
    if offset != session.data.len() as u64 {
        return StatusCode::BAD_REQUEST.into_response();
    }
    session.data.extend_from_slice(&body);

    match scripted {
        Some(ChunkOverride::PartialAck(n)) => {
            session.data.truncate(n as usize);
            ack(n)
        }
        Some(ChunkOverride::AckAllWithoutToken) => {
            session.finalized = session.data.len() as u64 == session.total;
            ack(session.data.len() as u64)
        }
        _ if request.command.contains("finalize") => {
            if session.data.len() as u64 != session.total {
                return StatusCode::BAD_REQUEST.into_response();
            }
            session.finalized = true;
            if matches!(scripted, Some(ChunkOverride::FinalWithoutBody)) {
                return StatusCode::OK.into_response();
            }
            (StatusCode::OK, format!("token-{id}")).into_response()
        }
        _ => ack(session.data.len() as u64),
    }
}

async fn batch_create(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let token = json["newMediaItems"][0]["simpleMediaItem"]["uploadToken"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    state
        .inner
        .lock()
        .expect("Mock state poisoned")
        .registered
        .push(json);

    let reply = serde_json::json!({
        "newMediaItemResults": [{
            "uploadToken": token,
            "status": { "message": "Success" },
            "mediaItem": {
                "id": format!("item-{token}"),
                "productUrl": format!("https://photos.example/item-{token}"),
            }
        }]
    });
    (StatusCode::OK, reply.to_string()).into_response()
}

/// Uploader against `server` with small chunks and a short deadline.
pub async fn uploader(
    server: &MockUploadServer,
    session_dir: &FsPath,
    chunk_size: usize,
) -> Uploader {
    uploader_with_timeout(server, session_dir, chunk_size, Duration::from_secs(10)).await
}

/// Uploader against `server` with an explicit per-request deadline.
pub async fn uploader_with_timeout(
    server: &MockUploadServer,
    session_dir: &FsPath,
    chunk_size: usize,
    chunk_timeout: Duration,
) -> Uploader {
    let store = SessionStore::with_dir(session_dir.to_path_buf())
        .await
        .expect("Failed to create session store");
    let options = UploadOptions {
        chunk_size,
        chunk_timeout,
        validator: Validator::default(),
    };
    Uploader::new(server.client(), store, options)
}
