//! The seam between the connection manager and a concrete socket library.

use crate::event::EventSink;
use crate::request::HandshakeRequest;

/// Opens duplex sockets.
///
/// A transport is constructed once and reused for every (re)connect.
/// Implementations must be `Send + Sync`; callbacks for a handle are delivered
/// through the [`EventSink`] passed to [`Transport::open`], from whatever task
/// the implementation chooses.
pub trait Transport: Send + Sync + 'static {
    /// Start the handshake for `request` and return the handle immediately.
    ///
    /// Must not block on the handshake. Success is reported as
    /// [`crate::TransportEvent::Opened`], failure as
    /// [`crate::TransportEvent::Failed`].
    fn open(&self, request: &HandshakeRequest, sink: EventSink) -> Box<dyn TransportHandle>;
}

/// A single opened socket.
pub trait TransportHandle: Send + Sync {
    /// Queue a text frame. Returns `false` if the handle can no longer send.
    fn send(&self, text: String) -> bool;

    /// Start a graceful close. Returns `false` if the handle is already gone.
    fn close(&self, code: u16, reason: &str) -> bool;

    /// The request this handle was opened with.
    fn request(&self) -> &HandshakeRequest;
}
