//! # tradefeed-socket
//!
//! A persistent duplex socket connection for real-time feeds.
//!
//! The [`ConnectionManager`] opens an authenticated socket, classifies every
//! disconnection as terminal or transient, re-opens transient ones after a
//! fixed delay, and multicasts both connection-state transitions and inbound
//! text frames to any number of consumers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tradefeed_socket::prelude::*;
//!
//! let manager = ConnectionManager::websocket(ManagerConfig::new("my-token"))?;
//!
//! // Current state first, then every transition
//! let mut states = manager.connect("wss://host/feed")?;
//! let mut messages = manager.observe_messages();
//!
//! while let Some(state) = states.recv().await {
//!     if state == ConnectionState::Connected {
//!         manager.send("{\"subscribe\":\"BTC\"}")?;
//!         break;
//!     }
//! }
//!
//! while let Some(text) = messages.recv().await {
//!     println!("{text}");
//! }
//! ```
//!
//! ## Reconnection policy
//!
//! | Disconnection | Outcome |
//! |---|---|
//! | Closed with code 1000 (what [`ConnectionManager::disconnect`] sends) | `Disconnected`, no retry |
//! | Closed with any other code | `Disconnected`, retry after `reconnect_delay` |
//! | Transport failure | `Disconnected`, retry after `reconnect_delay` |
//!
//! Retries replay the original handshake request (address and auth header)
//! and continue indefinitely with a fixed delay.

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod reconnect;
pub mod state;

pub use config::ManagerConfig;
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use error::{ConnectionError, Result};
pub use manager::ConnectionManager;
pub use reconnect::{PendingReconnect, ReconnectScheduler};
pub use state::ConnectionState;

// Re-export the collaborator crates' public types
pub use socket_bus::{BlockingIter, BusStream, MessageBus, StateBus};
pub use socket_transport::{
    CloseCode, EventSink, HandshakeRequest, SessionEvent, SessionId, Transport, TransportError,
    TransportEvent, TransportHandle, WsTransport,
};

/// Prelude module for convenient imports
///
/// ```rust
/// use tradefeed_socket::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BusStream, CloseCode, ConnectionError, ConnectionManager, ConnectionState,
        HandshakeRequest, ManagerConfig, Result, Transport, TransportEvent, TransportHandle,
        WsTransport,
    };
}
