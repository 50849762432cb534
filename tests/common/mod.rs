//! In-process fake fileserver and fixtures shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Multipart, Path as UrlPath, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;

use modelpub::config::{
    ConverterConfig, IndexConfig, LoggingConfig, PublishConfig, SceneConfig, ServerConfig,
    Settings, UploadConfig, WorkspaceConfig,
};
use modelpub::convert::{ConversionOutput, Converter};
use modelpub::error::{PublishError, Result};

pub const API_KEY: &str = "test-key";

/// One multipart part received by the fake upload endpoint
#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub field: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub asset: String,
    pub query: Option<String>,
    pub api_key: Option<String>,
    pub parts: Vec<ReceivedPart>,
}

#[derive(Debug, Clone)]
pub struct ReceivedPut {
    pub api_key: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub status: StatusCode,
}

/// Behavior and recorded traffic of the fake fileserver
#[derive(Debug)]
pub struct FakeState {
    /// `None` until the first catalog write
    pub catalog: Option<Value>,
    pub version: u64,
    /// Send ETags and honor `If-Match` / `If-None-Match`
    pub etags: bool,
    pub upload_status: StatusCode,
    pub upload_delay: Option<Duration>,
    /// Holds every catalog GET this long before answering
    pub index_get_delay: Option<Duration>,
    /// Forces every catalog GET to answer with this status
    pub index_get_status: Option<StatusCode>,
    /// Raw body served for the catalog instead of the stored one
    pub index_get_body: Option<String>,
    /// Forces every catalog PUT to answer with this status
    pub put_status: Option<StatusCode>,
    /// Entries another publisher writes right before each of the next PUTs
    pub interfering_writes: Vec<(String, Value)>,
    pub uploads: Vec<ReceivedUpload>,
    pub gets: usize,
    pub puts: Vec<ReceivedPut>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            catalog: None,
            version: 0,
            etags: false,
            upload_status: StatusCode::CREATED,
            upload_delay: None,
            index_get_delay: None,
            index_get_status: None,
            index_get_body: None,
            put_status: None,
            interfering_writes: Vec::new(),
            uploads: Vec::new(),
            gets: 0,
            puts: Vec::new(),
        }
    }
}

impl FakeState {
    fn etag(&self) -> String {
        format!("\"v{}\"", self.version)
    }

    pub fn requests(&self) -> usize {
        self.uploads.len() + self.gets + self.puts.len()
    }
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeServer {
    pub url: String,
    pub state: Shared,
}

impl FakeServer {
    pub async fn start(state: FakeState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = Router::new()
            .route("/models/{asset}/", post(upload))
            .route("/index.json", get(get_index).put(put_index))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url: format!("http://{}/", addr), state }
    }

    pub fn catalog(&self) -> Option<Value> {
        self.state.lock().unwrap().catalog.clone()
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn upload(
    State(state): State<Shared>,
    UrlPath(asset): UrlPath<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> StatusCode {
    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        parts.push(ReceivedPart { field: name, file_name, bytes });
    }

    let delay = state.lock().unwrap().upload_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().unwrap();
    state.uploads.push(ReceivedUpload {
        asset,
        query,
        api_key: header_value(&headers, "x-fileserver-api-key"),
        parts,
    });
    state.upload_status
}

async fn get_index(State(state): State<Shared>) -> Response {
    let delay = state.lock().unwrap().index_get_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().unwrap();
    state.gets += 1;

    if let Some(status) = state.index_get_status {
        return (status, "index unavailable").into_response();
    }
    let body = match (&state.index_get_body, &state.catalog) {
        (Some(raw), _) => raw.clone(),
        (None, Some(catalog)) => catalog.to_string(),
        (None, None) => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut response = (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response();
    if state.etags {
        let etag = state.etag();
        response.headers_mut().insert(header::ETAG, etag.parse().unwrap());
    }
    response
}

async fn put_index(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let mut state = state.lock().unwrap();

    if !state.interfering_writes.is_empty() {
        let (name, record) = state.interfering_writes.remove(0);
        let mut catalog = state.catalog.take().unwrap_or_else(|| serde_json::json!({}));
        catalog[name] = record;
        state.catalog = Some(catalog);
        state.version += 1;
    }

    let if_match = header_value(&headers, "if-match");
    let if_none_match = header_value(&headers, "if-none-match");

    let status = if let Some(status) = state.put_status {
        status
    } else if state.etags && if_match.as_ref().is_some_and(|tag| *tag != state.etag()) {
        StatusCode::PRECONDITION_FAILED
    } else if state.etags && if_none_match.as_deref() == Some("*") && state.catalog.is_some() {
        StatusCode::PRECONDITION_FAILED
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(catalog) => {
                state.catalog = Some(catalog);
                state.version += 1;
                StatusCode::CREATED
            }
            Err(_) => StatusCode::BAD_REQUEST,
        }
    };

    state.puts.push(ReceivedPut {
        api_key: header_value(&headers, "x-fileserver-api-key"),
        if_match,
        if_none_match,
        status,
    });
    status
}

/// Settings pointing at `server_url` with the workspace under `root`
pub fn test_settings(server_url: &str, root: &Path) -> Settings {
    Settings {
        server: ServerConfig { url: server_url.to_string(), api_key: API_KEY.to_string() },
        upload: UploadConfig { timeout_secs: 5 },
        index: IndexConfig {
            path: "index.json".to_string(),
            timeout_secs: 5,
            conditional_writes: true,
            max_attempts: 3,
        },
        workspace: WorkspaceConfig {
            models_dir: root.join("models"),
            textures_dir: root.join("textures"),
        },
        publish: PublishConfig { source: "blenderkit".to_string(), scale: 1.0 },
        converter: ConverterConfig { program: "blender".to_string(), args: Vec::new() },
        scene: SceneConfig {
            template: root.join("demo.sdf.template"),
            output: root.join("worlds/demo.sdf"),
        },
        logging: LoggingConfig { level: "debug".to_string(), file: None },
    }
}

/// Converter that writes a fixed set of files instead of running a tool
pub struct FixtureConverter {
    pub files: Vec<(PathBuf, Vec<u8>)>,
    /// Extra directory the "converter" populates, e.g. textures
    pub textures_dir: Option<PathBuf>,
}

impl FixtureConverter {
    pub fn new(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files.iter().map(|(p, c)| (PathBuf::from(p), c.to_vec())).collect(),
            textures_dir: None,
        }
    }
}

#[async_trait]
impl Converter for FixtureConverter {
    async fn convert(&self, _source: &Path, target_dir: &Path, _asset_name: &str) -> Result<ConversionOutput> {
        for (relative, content) in &self.files {
            let path = target_dir.join(relative);
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(path, content)?;
        }
        if let Some(textures) = &self.textures_dir {
            std::fs::create_dir_all(textures)?;
            std::fs::write(textures.join("fur.png"), b"png")?;
        }
        Ok(ConversionOutput { model_dir: target_dir.to_path_buf() })
    }
}

pub struct FailingConverter;

#[async_trait]
impl Converter for FailingConverter {
    async fn convert(&self, source: &Path, _target_dir: &Path, _asset_name: &str) -> Result<ConversionOutput> {
        Err(PublishError::Conversion(format!("cannot read {}", source.display())))
    }
}
