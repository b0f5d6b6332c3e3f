//! WebSocket transport backed by tokio-tungstenite.
//!
//! Each [`WsTransport::open`] spawns one connection task that owns the socket.
//! The returned [`WsHandle`] only holds the sending half of a command queue, so
//! `send` and `close` never block and frames queued before the handshake
//! completes are flushed once the socket is open.

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::event::{CloseCode, EventSink, TransportEvent};
use crate::request::HandshakeRequest;
use crate::transport::{Transport, TransportHandle};

/// Commands from a handle to its connection task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// A [`Transport`] that opens real WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsTransport {
    runtime: Handle,
}

impl WsTransport {
    /// Create a transport that spawns its connection tasks on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NoRuntime` when called outside a tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))?;
        Ok(Self { runtime })
    }

    /// Create a transport that spawns its connection tasks on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Transport for WsTransport {
    fn open(&self, request: &HandshakeRequest, sink: EventSink) -> Box<dyn TransportHandle> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.runtime
            .spawn(run_connection(request.clone(), outbound_rx, sink));

        Box::new(WsHandle {
            request: request.clone(),
            outbound: outbound_tx,
        })
    }
}

/// Handle to a socket opened by [`WsTransport`].
///
/// Dropping the handle without calling `close` closes the socket with
/// [`CloseCode::NORMAL_CLOSURE`].
pub struct WsHandle {
    request: HandshakeRequest,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportHandle for WsHandle {
    fn send(&self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    fn close(&self, code: u16, reason: &str) -> bool {
        self.outbound
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .is_ok()
    }

    fn request(&self) -> &HandshakeRequest {
        &self.request
    }
}

/// Owns one socket from handshake to close, reporting through `sink`.
async fn run_connection(
    request: HandshakeRequest,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    sink: EventSink,
) {
    let session = sink.session();

    let client_request = match request.to_client_request() {
        Ok(client_request) => client_request,
        Err(e) => {
            sink.emit(TransportEvent::Failed {
                error: e.to_string(),
            });
            return;
        }
    };

    debug!(%session, address = %request.address(), "Opening socket");

    let socket = match connect_async(client_request).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            sink.emit(TransportEvent::Failed {
                error: format!("handshake failed: {e}"),
            });
            return;
        }
    };

    info!(%session, address = %request.address(), "Socket open");
    sink.emit(TransportEvent::Opened);

    let (mut write, mut read) = socket.split();

    // Close we started, and close frame the peer sent
    let mut local_close: Option<(u16, String)> = None;
    let mut peer_close: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            command = outbound.recv(), if local_close.is_none() && peer_close.is_none() => {
                let (code, reason) = match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            sink.emit(TransportEvent::Failed { error: format!("send failed: {e}") });
                            return;
                        }
                        continue;
                    }
                    Some(Outbound::Close { code, reason }) => {
                        sink.emit(TransportEvent::Closing { code, reason: reason.clone() });
                        (code, reason)
                    }
                    // Handle dropped without an explicit close
                    None => (CloseCode::NORMAL_CLOSURE, String::new()),
                };

                debug!(%session, code, reason = %reason, "Sending close frame");
                let frame = CloseFrame {
                    code: WsCloseCode::from(code),
                    reason: reason.clone().into(),
                };
                local_close = Some((code, reason));
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    debug!(%session, error = %e, "Close frame not delivered");
                    break;
                }
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEvent::Message(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                        None => (CloseCode::NO_STATUS_RECEIVED, String::new()),
                    };
                    debug!(%session, code, reason = %reason, "Peer sent close frame");
                    if local_close.is_none() {
                        sink.emit(TransportEvent::Closing { code, reason: reason.clone() });
                    }
                    peer_close = Some((code, reason));
                }
                // Binary frames are not part of the feed; ping/pong is answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed)) | None => break,
                Some(Err(e)) => {
                    if local_close.is_none() && peer_close.is_none() {
                        warn!(%session, error = %e, "Socket error");
                        sink.emit(TransportEvent::Failed { error: e.to_string() });
                        return;
                    }
                    debug!(%session, error = %e, "Socket error while closing");
                    break;
                }
            },
        }
    }

    match peer_close.or(local_close) {
        Some((code, reason)) => {
            info!(%session, code, reason = %reason, "Socket closed");
            sink.emit(TransportEvent::Closed { code, reason });
        }
        None => {
            warn!(%session, "Socket ended without a close frame");
            sink.emit(TransportEvent::Failed {
                error: "connection ended without a close frame".to_string(),
            });
        }
    }
}
