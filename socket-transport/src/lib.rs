//! # socket-transport
//!
//! The duplex socket adapter underneath `tradefeed-socket`.
//!
//! A [`Transport`] opens one socket per call from a [`HandshakeRequest`]
//! (address plus `Authorization: Bearer <token>`) and reports every lifecycle
//! callback as a [`TransportEvent`] through an [`EventSink`]. Events are tagged
//! with the [`SessionId`] of the handle that produced them so the consumer can
//! tell a live handle from a superseded one.
//!
//! The crate knows nothing about reconnection or state; it only moves frames.

mod error;
mod event;
mod request;
mod transport;
pub mod ws;

pub use error::{Result, TransportError};
pub use event::{CloseCode, EventSink, SessionEvent, SessionId, TransportEvent};
pub use request::HandshakeRequest;
pub use transport::{Transport, TransportHandle};
pub use ws::WsTransport;
