//! Lifecycle events reported by a transport handle.

use tokio::sync::mpsc;

/// Well-known close codes.
pub struct CloseCode;

impl CloseCode {
    /// Locally initiated, graceful shutdown. Receiving it suppresses reconnection.
    pub const NORMAL_CLOSURE: u16 = 1000;
    /// Reason sent alongside [`CloseCode::NORMAL_CLOSURE`].
    pub const NORMAL_CLOSURE_REASON: &'static str = "DISCONNECT";
    /// The peer closed without a status code.
    pub const NO_STATUS_RECEIVED: u16 = 1005;
    /// The connection dropped without a close frame.
    pub const ABNORMAL_CLOSURE: u16 = 1006;
}

/// Identifier of one opened handle.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A raw lifecycle callback from the socket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed
    Opened,
    /// A close has started, locally or by the peer
    Closing { code: u16, reason: String },
    /// A text frame arrived
    Message(String),
    /// The socket is fully closed
    Closed { code: u16, reason: String },
    /// The socket failed (handshake error, I/O error, dropped connection)
    Failed { error: String },
}

impl TransportEvent {
    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Opened => "opened",
            TransportEvent::Closing { .. } => "closing",
            TransportEvent::Message(_) => "message",
            TransportEvent::Closed { .. } => "closed",
            TransportEvent::Failed { .. } => "failed",
        }
    }
}

/// A transport event tagged with the handle that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: TransportEvent,
}

/// Where a handle delivers its events.
///
/// Cloneable and cheap; every event is tagged with this sink's session id.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event. Returns `false` once the consumer is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}
