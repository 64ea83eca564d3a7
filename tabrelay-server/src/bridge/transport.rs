//! Transport adapter
//!
//! Owns the one channel to the counterpart process. Writes go through an
//! outbound queue drained by a single I/O task; reads are decoded by the
//! same task and pushed, in order, onto the inbound queue handed back by
//! `open`.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use tabrelay_protocol::{CodecError, Frame, FrameCodec};

use super::correlator::Correlator;
use super::error::BridgeError;

/// Capacity of the outbound frame queue unless configured otherwise
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

/// Inbound frames, in channel order
pub type InboundFrames = mpsc::UnboundedReceiver<Frame>;

/// Where the counterpart process can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// This process's stdin/stdout, as used by a browser-launched native host
    Stdio,
    /// A TCP peer speaking the same framing
    Tcp(String),
}

/// Channel state, observable through [`TransportAdapter::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

struct Link {
    outbound: mpsc::Sender<Frame>,
    shutdown: Option<oneshot::Sender<()>>,
    io_task: JoinHandle<()>,
}

/// Single bidirectional frame channel
pub struct TransportAdapter {
    correlator: Arc<Correlator>,
    codec: FrameCodec,
    outbound_queue: usize,
    state_tx: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
}

impl TransportAdapter {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            correlator,
            codec: FrameCodec::native_host(),
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            state_tx,
            link: Mutex::new(None),
        }
    }

    /// Override the outbound codec (defaults to the native host limits)
    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_outbound_queue(mut self, capacity: usize) -> Self {
        self.outbound_queue = capacity.max(1);
        self
    }

    /// Open the channel to `endpoint`
    ///
    /// Fails fast without retrying; retry policy belongs to the caller.
    pub async fn open(&self, endpoint: &Endpoint) -> Result<InboundFrames, BridgeError> {
        self.ensure_disconnected()?;

        match endpoint {
            Endpoint::Stdio => {
                info!("Opening channel on stdio");
                self.open_with(tokio::io::stdin(), tokio::io::stdout())
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await.map_err(|e| {
                    BridgeError::ConnectionFailed(format!("{}: {}", addr, e))
                })?;
                info!(%addr, "Opened channel over TCP");
                let (reader, writer) = stream.into_split();
                self.open_with(reader, writer)
            }
        }
    }

    /// Open the channel over an already connected reader/writer pair
    pub fn open_with<R, W>(&self, reader: R, writer: W) -> Result<InboundFrames, BridgeError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut link = self.link.lock();
        self.ensure_disconnected()?;

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_queue);
        // Unbounded so the reader never waits on the dispatcher
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let io_task = tokio::spawn(run_io(
            FramedRead::new(reader, FrameCodec::new()),
            FramedWrite::new(writer, self.codec.clone()),
            outbound_rx,
            inbound_tx,
            shutdown_rx,
            Arc::clone(&self.correlator),
            self.state_tx.clone(),
        ));

        *link = Some(Link {
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            io_task,
        });
        self.state_tx.send_replace(ConnectionState::Connected);

        Ok(inbound_rx)
    }

    /// Queue one frame for writing
    ///
    /// Never buffers while disconnected.
    pub async fn send(&self, frame: Frame) -> Result<(), BridgeError> {
        if self.state() != ConnectionState::Connected {
            return Err(BridgeError::NotConnected);
        }

        // Checked here so an oversized frame fails only its sender
        self.codec.check_outbound(&frame)?;

        let outbound = match self.link.lock().as_ref() {
            Some(link) => link.outbound.clone(),
            None => return Err(BridgeError::NotConnected),
        };

        outbound
            .send(frame)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }

    /// Flush queued frames, close the channel, and wait for the drain
    pub async fn close(&self) {
        let link = self.link.lock().take();
        let Some(mut link) = link else {
            return;
        };

        if let Some(shutdown) = link.shutdown.take() {
            let _ = shutdown.send(());
        }
        drop(link.outbound);

        if let Err(e) = link.io_task.await {
            error!("Channel I/O task failed: {}", e);
            // The task never reached its own cleanup
            self.correlator.fail_all(BridgeError::ChannelClosed);
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn ensure_disconnected(&self) -> Result<(), BridgeError> {
        match self.state() {
            ConnectionState::Connected => Err(BridgeError::AlreadyConnected),
            ConnectionState::Disconnected => Ok(()),
        }
    }
}

async fn run_io<R, W>(
    mut stream: FramedRead<R, FrameCodec>,
    mut sink: FramedWrite<W, FrameCodec>,
    mut outbound_rx: mpsc::Receiver<Frame>,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    mut shutdown_rx: oneshot::Receiver<()>,
    correlator: Arc<Correlator>,
    state_tx: watch::Sender<ConnectionState>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            Some(frame) = outbound_rx.recv() => {
                let kind = frame.kind.clone();
                match sink.send(frame).await {
                    Ok(()) => {}
                    Err(CodecError::Io(e)) => {
                        error!(%kind, "Failed to write frame: {}", e);
                        break;
                    }
                    // Rejected before any bytes were written
                    Err(e) => warn!(%kind, "Dropped unencodable frame: {}", e),
                }
            }
            result = stream.next() => {
                match result {
                    Some(Ok(frame)) => {
                        debug!(kind = %frame.kind, "Received frame");
                        if inbound_tx.send(frame).is_err() {
                            debug!("Inbound queue dropped");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Failed to read frame: {}", e);
                        break;
                    }
                    None => {
                        info!("Channel closed by peer");
                        break;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                debug!("Channel shutdown requested");
                outbound_rx.close();
                while let Ok(frame) = outbound_rx.try_recv() {
                    if let Err(e) = sink.send(frame).await {
                        warn!("Dropped queued frame during shutdown: {}", e);
                        break;
                    }
                }
                break;
            }
        }
    }

    // Refuse new frames first so nothing registers against a dead channel,
    // then fail what is pending, then report the channel closed.
    outbound_rx.close();
    correlator.fail_all(BridgeError::ChannelClosed);
    state_tx.send_replace(ConnectionState::Disconnected);
}
