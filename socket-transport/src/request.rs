//! The handshake request replayed on every (re)connect.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use url::Url;

use crate::error::{Result, TransportError};

const AUTH_PREFIX: &str = "Bearer ";

/// Address plus authorization for one socket handshake.
///
/// Built once per `connect` and kept by the session so a reconnect reuses it
/// verbatim: same address, same token, no re-derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    address: String,
    token: String,
    authorization: HeaderValue,
}

impl HandshakeRequest {
    /// Validate `address` and `token` and build the request.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidAddress` unless `address` is an absolute
    /// `ws://` or `wss://` URL, and `TransportError::InvalidToken` if the token
    /// cannot be sent as a header value.
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let token = token.into();

        let url = Url::parse(&address).map_err(|e| TransportError::InvalidAddress {
            address: address.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidAddress {
                address,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let authorization = HeaderValue::from_str(&format!("{AUTH_PREFIX}{token}"))
            .map_err(|e| TransportError::InvalidToken(e.to_string()))?;

        Ok(Self {
            address,
            token,
            authorization,
        })
    }

    /// The socket address exactly as the caller passed it.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The raw bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The `Authorization` header value, `Bearer <token>`.
    pub fn authorization(&self) -> &HeaderValue {
        &self.authorization
    }

    /// Build the HTTP upgrade request with the authorization header attached.
    pub fn to_client_request(&self) -> Result<Request<()>> {
        let mut request = self
            .address
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.authorization.clone());
        Ok(request)
    }
}
