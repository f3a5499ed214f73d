//! [`GatewayServer`] – HTTP + WebSocket server for sensors, operators, and
//! viewers.
//!
//! Listens on `0.0.0.0:3000` (configurable via [`GatewayServer::with_port`]).
//!
//! * `POST /api/sensor/update` → ingest pipeline → pose broadcast.
//! * `PUT /api/models/{id}/reference-point` / `PUT /api/models/{id}/unit` →
//!   operator calibration actions on the model registry.
//! * WebSocket upgrades → live pose subscription (initial pose on connect).
//! * Any other GET → the embedded status page.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use sitelink_broadcast::PoseHub;
use sitelink_ingest::{IngestPipeline, SensorReport};
use sitelink_registry::{ModelStore, RegistryError};
use sitelink_types::ReferencePoint;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Default TCP port for the gateway.
pub const DEFAULT_PORT: u16 = 3000;

/// The compiled-in status/viewer page served on plain GET.
const STATUS_HTML: &str = include_str!("status.html");

/// Upper bound on HTTP header bytes; anything larger is rejected.
const MAX_HEADER_BYTES: usize = 8 * 1024;
/// Upper bound on request body bytes.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Errors from the gateway's listener and connection plumbing.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("bind error on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),
    #[error("malformed HTTP request: {0}")]
    BadRequest(&'static str),
}

// ---------------------------------------------------------------------------
// GatewayState
// ---------------------------------------------------------------------------

/// Everything a connection handler needs, built once at startup.
pub struct GatewayState {
    pub pipeline: Arc<IngestPipeline>,
    pub hub: PoseHub,
    pub store: Arc<tokio::sync::Mutex<ModelStore>>,
}

// ---------------------------------------------------------------------------
// GatewayServer
// ---------------------------------------------------------------------------

/// Lightweight HTTP + WebSocket server fronting the ingest pipeline, the
/// model registry, and the pose hub.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use sitelink_broadcast::PoseHub;
/// use sitelink_gateway::GatewayServer;
/// use sitelink_ingest::IngestPipeline;
/// use sitelink_registry::{ModelStore, SqliteCalibrationSource};
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(tokio::sync::Mutex::new(
///         ModelStore::open_in_memory().expect("registry"),
///     ));
///     let source = SqliteCalibrationSource::new(Arc::clone(&store));
///     let pipeline = Arc::new(IngestPipeline::new(
///         Arc::new(source),
///         Duration::from_secs(2),
///     ));
///     GatewayServer::new(pipeline, PoseHub::default(), store)
///         .run()
///         .await
///         .expect("gateway failed");
/// }
/// ```
pub struct GatewayServer {
    state: Arc<GatewayState>,
    port: u16,
}

impl GatewayServer {
    /// Create a server on the [`DEFAULT_PORT`].
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        hub: PoseHub,
        store: Arc<tokio::sync::Mutex<ModelStore>>,
    ) -> Self {
        Self {
            state: Arc::new(GatewayState {
                pipeline,
                hub,
                store,
            }),
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start the server.
    ///
    /// Listens for TCP connections and dispatches each one as either a
    /// WebSocket pose subscription (when the request contains `Upgrade:
    /// websocket`) or a plain HTTP request.
    pub async fn run(self) -> Result<(), GatewayError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;

        info!(port = self.port, "gateway listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, state).await {
                            warn!(%peer, error = %e, "client connection error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept error");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<GatewayState>,
) -> Result<(), GatewayError> {
    // Peek at the first bytes of the request to decide whether to upgrade to
    // WebSocket or handle plain HTTP. `peek` does not consume the data, so
    // tungstenite's handshaker sees the full HTTP request.
    let mut buf = [0u8; 1024];
    let n = stream.peek(&mut buf).await?;

    let header_preview = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = header_preview.lines().any(|line| {
        line.to_lowercase().starts_with("upgrade:") && line.to_lowercase().contains("websocket")
    });

    if is_ws_upgrade {
        handle_ws(stream, peer, state).await
    } else {
        handle_http(stream, state).await
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP
// ---------------------------------------------------------------------------

struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

struct HttpResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl HttpResponse {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.to_string(),
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

async fn handle_http(mut stream: TcpStream, state: Arc<GatewayState>) -> Result<(), GatewayError> {
    let response = match read_request(&mut stream).await {
        Ok(request) => handle_request(&request, &state).await,
        Err(GatewayError::BadRequest(detail)) => {
            HttpResponse::json(400, json!({ "error": detail }))
        }
        Err(other) => return Err(other),
    };
    write_response(&mut stream, &response).await
}

/// Read one HTTP request: header block, then `Content-Length` bytes of body.
async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> Result<HttpRequest, GatewayError> {
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(GatewayError::BadRequest("connection closed mid-request"));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(GatewayError::BadRequest("header block too large"));
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = header_text.lines();
    let request_line = lines
        .next()
        .ok_or(GatewayError::BadRequest("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or(GatewayError::BadRequest("missing method"))?
        .to_string();
    let path = parts
        .next()
        .ok_or(GatewayError::BadRequest("missing path"))?
        .to_string();

    let content_length = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .next()
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(GatewayError::BadRequest("body too large"));
    }

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(GatewayError::BadRequest("connection closed mid-body"));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest { method, path, body })
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

async fn write_response(
    stream: &mut TcpStream,
    response: &HttpResponse,
) -> Result<(), GatewayError> {
    let raw = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len(),
        response.body
    );
    stream.write_all(raw.as_bytes()).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UnitUpdate {
    unit: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelRegistration {
    file_name: String,
    object_id: String,
    urn: String,
}

async fn handle_request(request: &HttpRequest, state: &GatewayState) -> HttpResponse {
    let path = request.path.split('?').next().unwrap_or("");
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("POST", ["api", "sensor", "update"]) => sensor_update(request, state).await,
        ("POST", ["api", "models"]) => register_model(request, state).await,
        ("GET", ["api", "models"]) => list_models(state).await,
        ("PUT", ["api", "models", model_id, "reference-point"]) => {
            set_reference_point(model_id, request, state).await
        }
        ("PUT", ["api", "models", model_id, "unit"]) => set_unit(model_id, request, state).await,
        ("GET", [""]) | ("GET", ["index.html"]) => HttpResponse::html(STATUS_HTML),
        _ => HttpResponse::json(404, json!({ "error": "Not found" })),
    }
}

async fn register_model(request: &HttpRequest, state: &GatewayState) -> HttpResponse {
    let registration: ModelRegistration = match serde_json::from_slice(&request.body) {
        Ok(registration) => registration,
        Err(_) => return HttpResponse::json(400, json!({ "error": "Invalid JSON" })),
    };

    let store = state.store.lock().await;
    match store.insert(
        &registration.file_name,
        &registration.object_id,
        &registration.urn,
    ) {
        Ok(record) => {
            info!(model_id = %record.id, file_name = %record.file_name, "model registered");
            HttpResponse::json(200, json!({ "success": true, "data": record }))
        }
        Err(err) => registry_error_response(err),
    }
}

async fn list_models(state: &GatewayState) -> HttpResponse {
    let store = state.store.lock().await;
    match store.list() {
        Ok(records) => HttpResponse::json(200, json!({ "success": true, "data": records })),
        Err(err) => registry_error_response(err),
    }
}

async fn sensor_update(request: &HttpRequest, state: &GatewayState) -> HttpResponse {
    let report: SensorReport = match serde_json::from_slice(&request.body) {
        Ok(report) => report,
        Err(_) => return HttpResponse::json(400, json!({ "error": "Invalid JSON" })),
    };

    match state.pipeline.ingest(report).await {
        Ok(event) => {
            let delivered = state.hub.publish(event.clone());
            debug!(actor_id = %event.actor_id, delivered, "broadcast pose");
            HttpResponse::json(200, json!({ "success": true, "data": event }))
        }
        Err(err) => HttpResponse::json(err.http_status(), json!({ "error": err.to_string() })),
    }
}

async fn set_reference_point(
    model_id: &str,
    request: &HttpRequest,
    state: &GatewayState,
) -> HttpResponse {
    let reference: ReferencePoint = match serde_json::from_slice(&request.body) {
        Ok(reference) => reference,
        Err(_) => return HttpResponse::json(400, json!({ "error": "Invalid JSON" })),
    };

    let store = state.store.lock().await;
    match store.set_reference_point(model_id, &reference) {
        Ok(()) => {
            info!(model_id, "reference point updated");
            HttpResponse::json(200, json!({ "success": true }))
        }
        Err(err) => registry_error_response(err),
    }
}

async fn set_unit(model_id: &str, request: &HttpRequest, state: &GatewayState) -> HttpResponse {
    let update: UnitUpdate = match serde_json::from_slice(&request.body) {
        Ok(update) => update,
        Err(_) => return HttpResponse::json(400, json!({ "error": "Invalid JSON" })),
    };

    let store = state.store.lock().await;
    match store.set_unit(model_id, &update.unit) {
        Ok(()) => {
            info!(model_id, unit = %update.unit, "model unit updated");
            HttpResponse::json(200, json!({ "success": true }))
        }
        Err(err) => registry_error_response(err),
    }
}

fn registry_error_response(err: RegistryError) -> HttpResponse {
    match err {
        RegistryError::NotFound(id) => {
            HttpResponse::json(404, json!({ "error": format!("Model not found: {id}") }))
        }
        other => HttpResponse::json(500, json!({ "error": other.to_string() })),
    }
}

// ---------------------------------------------------------------------------
// WebSocket: pose subscription
// ---------------------------------------------------------------------------

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<GatewayState>,
) -> Result<(), GatewayError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| GatewayError::Handshake(format!("{peer}: {e}")))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    // Subscribe before the initial pose goes out so nothing published in
    // between is missed.
    let mut poses = state.hub.subscribe();

    info!(%peer, "viewer connected");

    // Initial render state: one synthetic pose before any real sensor data.
    match serde_json::to_string(&PoseHub::initial_pose()) {
        Ok(json) => {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                return Ok(());
            }
        }
        Err(e) => warn!(error = %e, "initial pose serialization error"),
    }

    loop {
        tokio::select! {
            // ── Downstream: hub → viewer ───────────────────────────────────
            result = poses.recv() => {
                match result {
                    Ok(event) => {
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "pose serialization error");
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        // Live-state stream: dropped events are simply lost.
                        warn!(%peer, lagged_by = n, "viewer lagged, coalescing");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            // ── Upstream: viewers are read-only; only track the close ──────
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    info!(%peer, "viewer disconnected");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
