//! Transport server using Axum.
//!
//! Mounts the HTTP call route, the socket upgrade path, a health probe and
//! an optional static-file fallback, then serves them until stopped.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    response::{IntoResponse, Json},
    routing::{any, get},
};
use dashmap::DashMap;
use micro_protocol::{CallPayload, CallResult, CallTarget};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use crate::client::ClientConnection;
use crate::{http, socket};

/// Trait implemented by the call router. Both adapters call it for every
/// inbound call.
pub trait CallHandler: Send + Sync + 'static {
    /// Route one call. Errors are turned into failure envelopes by the caller.
    fn handle_call(
        &self,
        target: CallTarget,
        payload: CallPayload,
    ) -> impl std::future::Future<Output = CallResult> + Send;

    /// Summary reported by the health probe.
    fn describe(&self) -> Value {
        json!({})
    }
}

/// Socket adapter configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Upgrade path
    pub path: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Outbound frames buffered per connection
    pub outbound_buffer: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: "/socket".into(),
            max_connections: Some(1024),
            outbound_buffer: 256,
        }
    }
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Prefix in front of `/{service}/{logic}/{function}` ("" or "/api")
    pub api_prefix: String,
    /// Field names lifted out of query/body into the payload's header fields
    pub allow_headers: Vec<String>,
    /// Accept multipart uploads and expose them as `data._files`
    pub upload_enabled: bool,
    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
    /// Serve files from this directory for unmatched paths
    pub static_dir: Option<PathBuf>,
    /// Socket adapter; `None` disables it
    pub socket: Option<SocketConfig>,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "127.0.0.1".into(),
            api_prefix: String::new(),
            allow_headers: vec!["token".into(), "accessKey".into(), "signature".into()],
            upload_enabled: true,
            max_body_bytes: 10 * 1024 * 1024,
            static_dir: None,
            socket: Some(SocketConfig::default()),
            enable_cors: true,
        }
    }
}

impl TransportConfig {
    /// `api_prefix` with a leading slash and no trailing slash, or "".
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.api_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

/// Shared state for the transport server.
pub(crate) struct AppState<H: CallHandler> {
    pub(crate) handler: Arc<H>,
    pub(crate) config: TransportConfig,
    /// Live socket connections (for health check and connection limit)
    pub(crate) connections: DashMap<String, ClientConnection>,
}

/// Build the axum router for `handler`. Exposed so tests can drive it
/// without binding a port.
pub fn build_router<H: CallHandler>(config: TransportConfig, handler: Arc<H>) -> Router {
    let call_route = format!(
        "{}/{{service}}/{{logic}}/{{function}}",
        config.normalized_prefix()
    );
    let socket_path = config.socket.as_ref().map(|s| s.path.clone());
    let static_dir = config.static_dir.clone();
    let enable_cors = config.enable_cors;
    let body_limit = config.max_body_bytes;

    let state = Arc::new(AppState {
        handler,
        config,
        connections: DashMap::new(),
    });

    let mut app = Router::new()
        .route("/health", get(health_handler::<H>))
        .route(&call_route, any(http::call_handler::<H>));

    if let Some(path) = socket_path {
        app = app.route(&path, get(socket::upgrade_handler::<H>));
    }

    let mut app = app
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}

/// The transport server. Owns the listener task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given call handler.
    pub async fn start<H: CallHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start with a handler that is shared with other subsystems.
    pub async fn start_shared<H: CallHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let hostname = config.hostname.clone();
        let socket_path = config.socket.as_ref().map(|s| s.path.clone());
        let prefix = config.normalized_prefix();
        let app = build_router(config, handler);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("Call route listening on http://{hostname}:{actual_port}{prefix}/{{service}}/{{logic}}/{{function}}");
        if let Some(path) = socket_path {
            info!("Socket listening on ws://{hostname}:{actual_port}{path}");
        }

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler<H: CallHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.connections.len(),
        "registry": state.handler.describe(),
    }))
}
