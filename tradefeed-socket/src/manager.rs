//! The connection manager: state machine and orchestrator.
//!
//! All mutations of the connection status and the live session happen under
//! one lock, whether they come from a caller (`connect`, `send`, `disconnect`)
//! or from the transport (events drained by a single dispatch task). Every
//! status change goes through [`Shared::set_state`], which updates the status
//! and publishes it on the state bus in the same critical section.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use socket_bus::{BusStream, MessageBus, StateBus};
use socket_transport::{
    CloseCode, EventSink, HandshakeRequest, SessionEvent, SessionId, Transport, TransportEvent,
    TransportHandle, WsTransport,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{ConnectionError, Result};
use crate::reconnect::{PendingReconnect, ReconnectScheduler};
use crate::state::ConnectionState;

/// The live association with one open transport handle.
struct Session {
    id: SessionId,
    request: HandshakeRequest,
    handle: Box<dyn TransportHandle>,
}

/// A transient disconnection waiting for its retry.
struct RetryEpisode {
    timer: PendingReconnect,
    request: HandshakeRequest,
}

/// Everything guarded by the manager lock.
struct Inner {
    status: ConnectionState,
    session: Option<Session>,
    retry: Option<RetryEpisode>,
    /// Set by `disconnect`; the live session ends without a retry
    close_requested: bool,
    next_session: u64,
}

struct Shared {
    config: ManagerConfig,
    transport: Box<dyn Transport>,
    scheduler: ReconnectScheduler,
    state_bus: StateBus<ConnectionState>,
    message_bus: MessageBus<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
    inner: Mutex<Inner>,
}

/// Persistent duplex socket connection.
///
/// Owns at most one transport handle at a time. Transient disconnections
/// (any close code other than 1000, or a transport failure) are retried after
/// `reconnect_delay` with the original handshake request, indefinitely.
///
/// Methods are synchronous and never wait for the network; progress is
/// observed on the streams returned by [`connect`](Self::connect),
/// [`observe_state`](Self::observe_state) and
/// [`observe_messages`](Self::observe_messages).
///
/// Must be created inside a tokio runtime; afterwards it may be used from any
/// thread.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl ConnectionManager {
    /// Create a manager over `transport`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Configuration` for an invalid config and
    /// `ConnectionError::NoRuntime` outside a tokio runtime.
    pub fn new(config: ManagerConfig, transport: impl Transport) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            scheduler: ReconnectScheduler::new(config.reconnect_delay, runtime.clone()),
            config,
            transport: Box::new(transport),
            state_bus: StateBus::new(ConnectionState::Disconnected),
            message_bus: MessageBus::new(),
            events: events_tx,
            inner: Mutex::new(Inner {
                status: ConnectionState::Disconnected,
                session: None,
                retry: None,
                close_requested: false,
                next_session: 1,
            }),
        });

        let dispatcher = runtime.spawn(dispatch_events(Arc::downgrade(&shared), events_rx));

        Ok(Self { shared, dispatcher })
    }

    /// Create a manager over a WebSocket transport on the current runtime.
    pub fn websocket(config: ManagerConfig) -> Result<Self> {
        let transport = WsTransport::new()?;
        Self::new(config, transport)
    }

    /// Connect to `address` unless a session already exists, and return the
    /// state feed.
    ///
    /// The returned stream yields the current state first, then every later
    /// transition, whether or not this call opened the socket. While the status
    /// is anything but `Disconnected` the call opens nothing.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Transport` if `address` is not a `ws://` or
    /// `wss://` URL. No state changes in that case.
    pub fn connect(&self, address: &str) -> Result<BusStream<ConnectionState>> {
        let request = HandshakeRequest::new(address, self.shared.config.auth_token.as_str())?;

        let mut inner = self.shared.inner.lock();
        let states = self.shared.state_bus.subscribe();
        inner.close_requested = false;

        if !inner.status.is_live() {
            if let Some(episode) = inner.retry.take() {
                debug!(epoch = episode.timer.epoch(), "Connect supersedes pending reconnect");
                episode.timer.cancel();
            }
            info!(address = %request.address(), "Connecting");
            self.shared.open_session(&mut inner, request);
        } else {
            debug!(status = %inner.status, "Connect reuses existing session");
        }

        Ok(states)
    }

    /// Queue `message` on the live socket.
    ///
    /// Frames sent while `Connecting` are delivered once the handshake
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::NotConnected` when there is no socket handle
    /// and `ConnectionError::SendFailed` when the handle stopped accepting
    /// frames.
    pub fn send(&self, message: impl Into<String>) -> Result<()> {
        let inner = self.shared.inner.lock();
        let Some(session) = &inner.session else {
            debug!("Send while disconnected");
            return Err(ConnectionError::NotConnected);
        };

        let message = message.into();
        debug!(session = %session.id, bytes = message.len(), "Sending frame");
        if session.handle.send(message) {
            Ok(())
        } else {
            Err(ConnectionError::SendFailed)
        }
    }

    /// Close gracefully with code 1000 and reason `"DISCONNECT"`.
    ///
    /// Also cancels a reconnect that is waiting to fire. The close completes
    /// asynchronously: the state feed shows `Disconnecting`, then
    /// `Disconnected`, and no retry follows. This holds even if the socket
    /// fails or closes abnormally before the close handshake completes, for
    /// instance while still `Connecting`. A later `connect` lifts it.
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        inner.close_requested = inner.session.is_some();

        if let Some(episode) = inner.retry.take() {
            info!(epoch = episode.timer.epoch(), "Disconnect cancels pending reconnect");
            episode.timer.cancel();
        }

        match &inner.session {
            Some(session) => {
                info!(session = %session.id, "Disconnecting");
                if !session
                    .handle
                    .close(CloseCode::NORMAL_CLOSURE, CloseCode::NORMAL_CLOSURE_REASON)
                {
                    debug!(session = %session.id, "Handle already gone");
                }
            }
            None => debug!("Disconnect with no open socket"),
        }
    }

    /// Flag an open connection as usable by the application protocol.
    ///
    /// Moves `Connected` to `Ready` and returns `true`; does nothing in any
    /// other state.
    pub fn mark_ready(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.status == ConnectionState::Connected {
            self.shared.set_state(&mut inner, ConnectionState::Ready);
            true
        } else {
            false
        }
    }

    /// The state feed, without connecting.
    pub fn observe_state(&self) -> BusStream<ConnectionState> {
        self.shared.state_bus.subscribe()
    }

    /// Inbound text frames published after this call.
    pub fn observe_messages(&self) -> BusStream<String> {
        self.shared.message_bus.subscribe()
    }

    /// The current status.
    pub fn status(&self) -> ConnectionState {
        self.shared.inner.lock().status
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.dispatcher.abort();

        let mut inner = self.shared.inner.lock();
        if let Some(episode) = inner.retry.take() {
            episode.timer.cancel();
        }
        if let Some(session) = inner.session.take() {
            debug!(session = %session.id, "ConnectionManager dropping, closing socket");
            session
                .handle
                .close(CloseCode::NORMAL_CLOSURE, CloseCode::NORMAL_CLOSURE_REASON);
        }
    }
}

impl Shared {
    /// The only writer of `status`.
    fn set_state(&self, inner: &mut Inner, next: ConnectionState) {
        if inner.status == next {
            return;
        }
        debug!(from = %inner.status, to = %next, "State transition");
        inner.status = next;
        self.state_bus.publish(next);
    }

    fn open_session(&self, inner: &mut Inner, request: HandshakeRequest) {
        let id = SessionId(inner.next_session);
        inner.next_session += 1;

        self.set_state(inner, ConnectionState::Connecting);

        let sink = EventSink::new(id, self.events.clone());
        let handle = self.transport.open(&request, sink);
        debug!(session = %id, address = %request.address(), "Transport opened");

        inner.session = Some(Session {
            id,
            request,
            handle,
        });
    }

    fn handle_event(self: &Arc<Self>, SessionEvent { session, event }: SessionEvent) {
        let mut inner = self.inner.lock();

        let current = inner.session.as_ref().map(|s| s.id);
        if current != Some(session) {
            debug!(%session, event = event.kind(), "Ignoring event from superseded session");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if inner.status == ConnectionState::Connecting {
                    info!(%session, "Connected");
                    self.set_state(&mut inner, ConnectionState::Connected);
                }
            }
            TransportEvent::Closing { code, reason } => {
                debug!(%session, code, reason = %reason, "Closing");
                self.set_state(&mut inner, ConnectionState::Disconnecting);
            }
            TransportEvent::Message(text) => {
                self.message_bus.publish(text);
            }
            TransportEvent::Closed { code, reason } => {
                let close_requested = std::mem::take(&mut inner.close_requested);
                let request = self.clear_session(&mut inner);
                if code == CloseCode::NORMAL_CLOSURE {
                    info!(%session, code, reason = %reason, "Closed");
                } else if close_requested {
                    info!(%session, code, reason = %reason, "Closed after disconnect, not retrying");
                } else {
                    warn!(%session, code, reason = %reason, "Closed abnormally");
                    self.schedule_reconnect(&mut inner, request);
                }
            }
            TransportEvent::Failed { error } => {
                let close_requested = std::mem::take(&mut inner.close_requested);
                let request = self.clear_session(&mut inner);
                if close_requested {
                    info!(%session, error = %error, "Transport failed after disconnect, not retrying");
                } else {
                    warn!(%session, error = %error, "Transport failure");
                    self.schedule_reconnect(&mut inner, request);
                }
            }
        }
    }

    /// Drop the live handle and return its request for a possible retry.
    fn clear_session(&self, inner: &mut Inner) -> Option<HandshakeRequest> {
        let session = inner.session.take();
        self.set_state(inner, ConnectionState::Disconnected);
        session.map(|s| s.request)
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner, request: Option<HandshakeRequest>) {
        let Some(request) = request else {
            return;
        };

        if let Some(stale) = inner.retry.take() {
            stale.timer.cancel();
        }

        let shared = Arc::downgrade(self);
        let timer = self.scheduler.schedule(move |epoch| {
            if let Some(shared) = shared.upgrade() {
                shared.reconnect_due(epoch);
            }
        });

        inner.retry = Some(RetryEpisode { timer, request });
    }

    fn reconnect_due(&self, epoch: u64) {
        let mut inner = self.inner.lock();

        let due = matches!(&inner.retry, Some(episode) if episode.timer.epoch() == epoch);
        if !due {
            debug!(epoch, "Ignoring cancelled reconnect");
            return;
        }
        let Some(episode) = inner.retry.take() else {
            return;
        };

        if inner.status.is_live() || inner.session.is_some() {
            debug!(epoch, status = %inner.status, "Session already exists, skipping reconnect");
            return;
        }

        info!(epoch, address = %episode.request.address(), "Reconnecting");
        self.open_session(&mut inner, episode.request);
    }
}

/// Drains transport events one at a time into the state machine.
async fn dispatch_events(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_event(event);
    }
    debug!("Event dispatcher stopped");
}
