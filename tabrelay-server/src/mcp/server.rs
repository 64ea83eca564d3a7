//! MCP HTTP endpoint
//!
//! JSON-RPC over `POST /mcp`, one request object per HTTP request. Tool
//! methods are forwarded to the browser extension through the
//! [`ToolBridge`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabrelay_utils::{RelayError, Result};

use super::error::McpError;
use super::protocol::{
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolsListResult,
};
use crate::bridge::ToolBridge;
use crate::config::McpConfig;
use crate::dispatch::ServerLifecycle;

/// Largest request body accepted on `/mcp`
const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

/// JSON-RPC method handling, independent of HTTP
pub struct McpHandler {
    bridge: ToolBridge,
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl McpHandler {
    pub fn new(bridge: ToolBridge) -> Self {
        Self { bridge }
    }

    /// Handle one request; notifications produce no response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.is_notification();
        let result = if request.jsonrpc != "2.0" {
            Err(McpError::InvalidRequest(format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            )))
        } else {
            match request.method.as_str() {
                "initialize" => self.handle_initialize(),
                "initialized" | "notifications/initialized" => Ok(json!({})),
                "ping" => Ok(json!({})),
                "tools/list" => self.handle_tools_list().await,
                "tools/call" => self.handle_tools_call(request.params).await,
                _ => Err(McpError::MethodNotFound(request.method.clone())),
            }
        };

        if is_notification {
            if let Err(e) = result {
                warn!(method = %request.method, error = %e, "Notification handling failed");
            }
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => {
                debug!(method = %request.method, error = %e, "Request failed");
                JsonRpcResponse::error(request.id, e.into())
            }
        })
    }

    /// Connection and status snapshot served on `/health`
    pub fn health(&self) -> Value {
        let session = self.bridge.session();
        json!({
            "connection": session.connection_state(),
            "pendingRequests": session.correlator().pending_count(),
            "server": session.status().current(),
        })
    }

    fn handle_initialize(&self) -> std::result::Result<Value, McpError> {
        info!("MCP client initialized");
        Ok(serde_json::to_value(InitializeResult::default())?)
    }

    async fn handle_tools_list(&self) -> std::result::Result<Value, McpError> {
        let tools = self.bridge.list_tools().await?;
        Ok(serde_json::to_value(ToolsListResult { tools })?)
    }

    async fn handle_tools_call(&self, params: Value) -> std::result::Result<Value, McpError> {
        let params: ToolCallParams = serde_json::from_value(params)
            .map_err(|e| McpError::InvalidParams(format!("tools/call: {}", e)))?;

        let arguments = if params.arguments.is_null() {
            json!({})
        } else {
            params.arguments
        };

        let result = self.bridge.call_tool(&params.name, arguments).await;
        Ok(serde_json::to_value(result)?)
    }
}

/// Route one HTTP request
async fn handle_http(
    req: Request<Incoming>,
    handler: Arc<McpHandler>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/mcp") => Ok(serve_rpc(req, &handler).await),
        (&Method::GET, "/health") => Ok(json_response(StatusCode::OK, &handler.health())),
        _ => Ok(empty_response(StatusCode::NOT_FOUND)),
    }
}

async fn serve_rpc(req: Request<Incoming>, handler: &McpHandler) -> Response<Full<Bytes>> {
    let body = match Limited::new(req.into_body(), MAX_BODY_SIZE).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read MCP request body: {}", e);
            return empty_response(StatusCode::PAYLOAD_TOO_LARGE);
        }
    };

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error: JsonRpcError = McpError::from(e).into();
            let response = JsonRpcResponse::error(Value::Null, error);
            return json_response(StatusCode::OK, &response);
        }
    };

    match handler.handle_request(request).await {
        Some(response) => json_response(StatusCode::OK, &response),
        None => empty_response(StatusCode::ACCEPTED),
    }
}

fn json_response(status: StatusCode, body: &impl serde::Serialize) -> Response<Full<Bytes>> {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to encode response: {}", e);
            return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Accept connections until shutdown is signalled
async fn serve(
    listener: TcpListener,
    handler: Arc<McpHandler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, remote_addr) = match accept_result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("MCP accept error: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    let service = service_fn(move |req| handle_http(req, Arc::clone(&handler)));

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        // Clients hanging up mid-request is routine
                        if !e.is_incomplete_message() {
                            warn!("MCP connection error from {}: {}", remote_addr, e);
                        }
                    }
                });
            }

            _ = shutdown_rx.recv() => {
                info!("MCP endpoint shutting down");
                break;
            }
        }
    }
}

struct RunningServer {
    port: u16,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Starts and stops the MCP endpoint on behalf of the dispatcher
pub struct McpServerControl {
    addr: SocketAddr,
    handler: Arc<McpHandler>,
    running: tokio::sync::Mutex<Option<RunningServer>>,
    last_port: parking_lot::Mutex<Option<u16>>,
}

impl McpServerControl {
    pub fn new(config: &McpConfig, bridge: ToolBridge) -> Result<Self> {
        let addr = config.socket_addr().map_err(|e| {
            RelayError::config(format!("invalid MCP bind address '{}': {}", config.bind_address, e))
        })?;

        Ok(Self {
            addr,
            handler: Arc::new(McpHandler::new(bridge)),
            running: tokio::sync::Mutex::new(None),
            last_port: parking_lot::Mutex::new(None),
        })
    }

    /// Port currently served, if running
    pub async fn port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|server| server.port)
    }

    async fn bind(&self) -> Result<TcpListener> {
        // With an ephemeral port configured, come back on the previous one
        // so clients that remembered it can reconnect.
        let remembered = *self.last_port.lock();
        if let (0, Some(port)) = (self.addr.port(), remembered) {
            let addr = SocketAddr::new(self.addr.ip(), port);
            match TcpListener::bind(addr).await {
                Ok(listener) => return Ok(listener),
                Err(e) => debug!(%addr, "Previous MCP port unavailable: {}", e),
            }
        }

        TcpListener::bind(self.addr).await.map_err(|e| RelayError::Bind {
            addr: self.addr.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl ServerLifecycle for McpServerControl {
    async fn start(&self) -> Result<u16> {
        let mut running = self.running.lock().await;
        if let Some(server) = running.as_ref() {
            debug!(port = server.port, "MCP endpoint already running");
            return Ok(server.port);
        }

        let listener = self.bind().await?;
        let port = listener.local_addr()?.port();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(serve(listener, Arc::clone(&self.handler), shutdown_rx));

        info!("MCP endpoint listening on http://{}:{}/mcp", self.addr.ip(), port);
        *self.last_port.lock() = Some(port);
        *running = Some(RunningServer {
            port,
            shutdown_tx,
            task,
        });
        Ok(port)
    }

    async fn stop(&self) -> Result<Option<u16>> {
        let Some(server) = self.running.lock().await.take() else {
            return Ok(*self.last_port.lock());
        };

        let _ = server.shutdown_tx.send(());
        server
            .task
            .await
            .map_err(|e| RelayError::internal(format!("MCP endpoint task failed: {}", e)))?;

        info!(port = server.port, "MCP endpoint stopped");
        Ok(Some(server.port))
    }
}
