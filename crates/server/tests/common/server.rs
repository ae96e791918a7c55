//! Server test utilities.

use super::fixtures::{Part, chunk_form, multipart_body, split_into_chunks};
use super::storage::FaultyStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chunkyard_core::config::AppConfig;
use chunkyard_server::{AppState, create_router};
use chunkyard_storage::{ChunkStore, FilesystemBackend};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Default `lastModified` used by the helpers.
pub const LAST_MODIFIED: i64 = 1_700_000_000_000;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// Fault injection for the chunk area.
    pub chunk_faults: Arc<FaultyStore>,
    /// Fault injection for the output area.
    pub output_faults: Arc<FaultyStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing(temp_dir.path());
        modifier(&mut config);

        let chunks = FilesystemBackend::new(&config.storage.chunk_dir)
            .await
            .expect("Failed to create chunk area");
        let files = FilesystemBackend::new(&config.storage.output_dir)
            .await
            .expect("Failed to create output area");

        let chunk_faults = Arc::new(FaultyStore::new(Arc::new(chunks)));
        let output_faults = Arc::new(FaultyStore::new(Arc::new(files)));
        let store = ChunkStore::new(chunk_faults.clone(), output_faults.clone());

        let state = AppState::new(config, store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            chunk_faults,
            output_faults,
            _temp_dir: temp_dir,
        }
    }

    pub fn chunk_dir(&self) -> PathBuf {
        self.state.config.storage.chunk_dir.clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.state.config.storage.output_dir.clone()
    }

    /// Names of the files currently in the chunk area, sorted.
    pub fn chunk_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.chunk_dir())
            .expect("chunk area readable")
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// GET a URI and decode the JSON body.
    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        into_json(self.send(request).await).await
    }

    /// GET /status for a file.
    pub async fn status(
        &self,
        filename: &str,
        total_chunks: u32,
        file_size: u64,
        last_modified: i64,
    ) -> (StatusCode, Value) {
        let uri = format!(
            "/status?filename={}&totalChunks={total_chunks}&fileSize={file_size}&lastModified={last_modified}",
            utf8_percent_encode(filename, NON_ALPHANUMERIC)
        );
        self.get_json(&uri).await
    }

    /// POST /upload with arbitrary form parts.
    pub async fn upload_form(&self, parts: &[Part<'_>]) -> (StatusCode, Value) {
        let (content_type, body) = multipart_body(parts);
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap();
        into_json(self.send(request).await).await
    }

    /// POST /upload for one chunk.
    pub async fn upload(
        &self,
        filename: &str,
        index: u32,
        total_chunks: u32,
        data: &[u8],
    ) -> (StatusCode, Value) {
        self.upload_form(&chunk_form(filename, index, total_chunks, data))
            .await
    }

    /// Query status and upload every chunk of `data` in order.
    /// Returns the response of the last upload.
    pub async fn upload_file(&self, filename: &str, data: &[u8], chunk_size: usize) -> Value {
        let chunks = split_into_chunks(data, chunk_size.max(1));
        let chunks = if chunks.is_empty() {
            vec![bytes::Bytes::new()]
        } else {
            chunks
        };
        let total = chunks.len() as u32;

        let (status, _) = self
            .status(filename, total, data.len() as u64, LAST_MODIFIED)
            .await;
        assert_eq!(status, StatusCode::OK);

        let mut last = Value::Null;
        for (index, chunk) in chunks.iter().enumerate() {
            let (status, body) = self.upload(filename, index as u32, total, chunk).await;
            assert_eq!(status, StatusCode::OK, "chunk {index} failed: {body}");
            last = body;
        }
        last
    }

    /// GET /download with an optional Range header.
    pub async fn download(&self, filename: &str, range: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri(format!(
            "/download?file={}",
            utf8_percent_encode(filename, NON_ALPHANUMERIC)
        ));
        if let Some(range) = range {
            builder = builder.header("range", range);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

/// Decode a response body as JSON (Null when empty or not JSON).
pub async fn into_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Read a response body to bytes.
#[allow(dead_code)]
pub async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}
