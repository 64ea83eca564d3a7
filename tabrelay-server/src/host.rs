//! Native host process
//!
//! Wires the bridge session, the dispatcher, and the MCP endpoint together
//! and runs them until the browser closes the channel or the process is
//! asked to terminate. Shutdown stops the endpoint and closes the channel
//! within [`SHUTDOWN_TIMEOUT`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tabrelay_utils::{RelayError, Result};

use crate::bridge::{BridgeSession, Endpoint, InboundFrames, ToolBridge};
use crate::config::AppConfig;
use crate::dispatch::{Dispatcher, FileStatusStore, StatusStore, StatusTracker};
use crate::mcp::McpServerControl;

/// Upper bound on cleanup once shutdown starts
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct NativeHost {
    config: AppConfig,
    session: Arc<BridgeSession>,
    dispatcher: Dispatcher,
}

impl NativeHost {
    /// Host persisting its status where the configuration says
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = Arc::new(FileStatusStore::new(config.status.path()));
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn StatusStore>) -> Result<Self> {
        let status = StatusTracker::new(store);
        let queue = config.bridge.outbound_queue;
        let session =
            BridgeSession::with_transport(status, |transport| transport.with_outbound_queue(queue));

        let bridge =
            ToolBridge::new(Arc::clone(&session)).with_timeout(config.bridge.request_timeout());
        let control = Arc::new(McpServerControl::new(&config.mcp, bridge)?);
        let dispatcher = Dispatcher::new(Arc::clone(&session)).with_lifecycle(control);

        Ok(Self {
            config,
            session,
            dispatcher,
        })
    }

    pub fn session(&self) -> &Arc<BridgeSession> {
        &self.session
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Open the channel and serve it until it closes or `shutdown` resolves
    pub async fn run(&self, endpoint: &Endpoint, shutdown: impl Future<Output = ()>) -> Result<()> {
        let inbound = self
            .session
            .open(endpoint)
            .await
            .map_err(|e| RelayError::channel(format!("failed to open {:?}: {}", endpoint, e)))?;
        info!(?endpoint, "Channel open");

        self.serve(inbound, shutdown).await;
        Ok(())
    }

    /// Serve an already opened channel
    pub async fn serve(&self, inbound: InboundFrames, shutdown: impl Future<Output = ()>) {
        if self.config.mcp.auto_start {
            if let Err(e) = self.dispatcher.start_server().await {
                warn!("Auto-start of the MCP endpoint failed: {}", e);
            }
        }

        let dispatcher = self.dispatcher.clone();
        let mut dispatching = spawn_logged("dispatcher", async move {
            dispatcher.run(inbound).await;
        });

        tokio::pin!(shutdown);
        tokio::select! {
            _ = &mut dispatching => info!("Channel closed by the extension"),
            _ = &mut shutdown => info!("Shutdown requested"),
        }

        self.shutdown().await;
    }

    async fn shutdown(&self) {
        let cleanup = async {
            // Also clears a "running" status left behind by an earlier crash
            if let Err(e) = self.dispatcher.stop_server().await {
                warn!("Failed to stop the MCP endpoint: {}", e);
            }
            self.session.close().await;
        };

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, cleanup).await.is_err() {
            warn!(
                "Shutdown did not finish within {}ms",
                SHUTDOWN_TIMEOUT.as_millis()
            );
        }
    }
}

/// Spawn a background task whose panic is logged instead of lost
pub fn spawn_logged<F>(name: &'static str, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let inner = tokio::spawn(task);
    tokio::spawn(async move {
        if let Err(e) = inner.await {
            if e.is_panic() {
                error!(task = name, "Background task panicked: {}", e);
            } else {
                warn!(task = name, "Background task cancelled");
            }
        }
    })
}

/// Resolves on Ctrl-C, or on SIGTERM where there is one
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received interrupt"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Log panics before the default hook reports them
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("panic: {}", info);
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ConnectionState;
    use crate::dispatch::{MemoryStatusStore, ServerStatus};
    use futures::{SinkExt, StreamExt};
    use serde_json::json;
    use tabrelay_protocol::{Frame, FrameCodec, FrameType, RequestId};
    use tokio::io::DuplexStream;
    use tokio::sync::oneshot;
    use tokio_util::codec::Framed;

    type Peer = Framed<DuplexStream, FrameCodec>;

    fn ephemeral_config(auto_start: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.mcp.port = 0;
        config.mcp.auto_start = auto_start;
        config
    }

    fn connected(host: &NativeHost) -> (InboundFrames, Peer) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(local);
        let inbound = host.session().transport().open_with(reader, writer).unwrap();
        (inbound, Framed::new(remote, FrameCodec::new()))
    }

    async fn next_frame(peer: &mut Peer) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), peer.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("channel closed")
            .expect("decode failed")
    }

    #[tokio::test]
    async fn test_start_stop_then_peer_hangs_up() {
        let store = Arc::new(MemoryStatusStore::new());
        let host = NativeHost::with_store(ephemeral_config(false), store.clone()).unwrap();
        let (inbound, mut peer) = connected(&host);

        let serving = async {
            host.serve(inbound, std::future::pending()).await;
        };
        let driving = async {
            peer.send(Frame::request(FrameType::Start, RequestId::new("s1"), json!({})))
                .await
                .unwrap();

            let notice = next_frame(&mut peer).await;
            assert_eq!(notice.kind, FrameType::ServerStarted);
            let port = notice.payload["port"].as_u64().unwrap();
            assert_ne!(port, 0);

            let reply = next_frame(&mut peer).await;
            assert_eq!(reply.response_to_request_id, Some(RequestId::new("s1")));
            assert_eq!(reply.payload["data"]["port"], json!(port));

            drop(peer);
        };
        tokio::join!(serving, driving);

        let saved: ServerStatus = store.saved().unwrap();
        assert!(!saved.is_running);
        assert!(saved.port.is_some());
        assert_eq!(host.session().connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_auto_start_and_shutdown_signal() {
        let host = NativeHost::with_store(
            ephemeral_config(true),
            Arc::new(MemoryStatusStore::new()),
        )
        .unwrap();
        let (inbound, mut peer) = connected(&host);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let serving = async {
            host.serve(inbound, async {
                let _ = stop_rx.await;
            })
            .await;
        };
        let driving = async {
            let started = next_frame(&mut peer).await;
            assert_eq!(started.kind, FrameType::ServerStarted);
            assert!(host.session().status().current().is_running);

            stop_tx.send(()).unwrap();

            let stopped = next_frame(&mut peer).await;
            assert_eq!(stopped.kind, FrameType::ServerStopped);
            assert_eq!(stopped.payload["port"], started.payload["port"]);

            // The channel is closed after the stop notice
            let end = tokio::time::timeout(Duration::from_secs(5), peer.next())
                .await
                .unwrap();
            assert!(end.is_none());
        };
        tokio::join!(serving, driving);

        assert!(!host.session().status().current().is_running);
    }

    #[tokio::test]
    async fn test_stale_running_status_cleared_on_exit() {
        let store = Arc::new(MemoryStatusStore::new());
        StatusTracker::new(store.clone()).record_started(4100);

        let host = NativeHost::with_store(ephemeral_config(false), store.clone()).unwrap();
        assert!(host.session().status().current().is_running);

        let (inbound, peer) = connected(&host);
        drop(peer);
        host.serve(inbound, std::future::pending()).await;

        assert!(!store.saved().unwrap().is_running);
    }

    #[tokio::test]
    async fn test_run_reports_unreachable_endpoint() {
        let host = NativeHost::with_store(
            ephemeral_config(false),
            Arc::new(MemoryStatusStore::new()),
        )
        .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = host
            .run(&Endpoint::Tcp(addr.to_string()), std::future::pending())
            .await;
        assert!(matches!(result, Err(RelayError::Channel(_))));
    }

    #[tokio::test]
    async fn test_invalid_bind_address_rejected() {
        let mut config = ephemeral_config(false);
        config.mcp.bind_address = "not-an-address".into();

        let result = NativeHost::with_store(config, Arc::new(MemoryStatusStore::new()));
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[tokio::test]
    async fn test_spawn_logged_survives_panic() {
        let handle = spawn_logged("panicky", async {
            panic!("boom");
        });
        assert!(handle.await.is_ok());
    }
}
