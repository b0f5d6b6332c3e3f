//! Configuration for the connection manager

use std::time::Duration;

use crate::error::{ConnectionError, Result};

/// Configuration for a [`crate::ConnectionManager`]
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Bearer token attached to every handshake
    /// Default: empty (rejected by `validate`)
    pub auth_token: String,

    /// Fixed delay before re-opening after a transient disconnection
    /// Default: 500 milliseconds
    pub reconnect_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

impl ManagerConfig {
    /// Create a config with the given token and default timings
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.auth_token.is_empty() {
            return Err(ConnectionError::Configuration(
                "Auth token must not be empty".to_string(),
            ));
        }

        if self.reconnect_delay == Duration::ZERO {
            return Err(ConnectionError::Configuration(
                "Reconnect delay must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = auth_token.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}
