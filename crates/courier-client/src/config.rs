//! Addresses derived from the server base address.

use courier_core::WEBSOCKET_PATH;
use reqwest::Url;

use crate::ClientError;

/// Where a client sends its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base: String,
    websocket_url: String,
}

impl ClientConfig {
    /// Derive the route and socket addresses from `address`.
    ///
    /// `address` is an `http` or `https` base such as
    /// `http://127.0.0.1:3030`; the socket lives at `ws://host:port/websocket`.
    ///
    /// # Errors
    /// Returns error if the address is not an absolute http(s) URL with a host.
    pub fn new(address: &str) -> Result<Self, ClientError> {
        let url = Url::parse(address)
            .map_err(|e| ClientError::InvalidAddress(format!("{address}: {e}")))?;

        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(ClientError::InvalidAddress(format!(
                    "{address}: unsupported scheme {other}"
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidAddress(format!("{address}: missing host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ClientError::InvalidAddress(format!("{address}: missing port")))?;

        Ok(Self {
            base: address.trim_end_matches('/').to_string(),
            websocket_url: format!("{scheme}://{host}:{port}{WEBSOCKET_PATH}"),
        })
    }

    /// Base address, without trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Address of one operation.
    #[must_use]
    pub fn route_url(&self, route: &str) -> String {
        format!("{}/{route}", self.base)
    }

    /// Address of the subscription socket.
    #[must_use]
    pub fn websocket_url(&self) -> &str {
        &self.websocket_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_base() {
        let config = ClientConfig::new("http://localhost:3030").unwrap();
        assert_eq!(config.route_url("getUser"), "http://localhost:3030/getUser");
        assert_eq!(config.websocket_url(), "ws://localhost:3030/websocket");
    }

    #[test]
    fn test_trailing_slash_and_default_port() {
        let config = ClientConfig::new("https://example.com/").unwrap();
        assert_eq!(config.base(), "https://example.com");
        assert_eq!(config.route_url("rename"), "https://example.com/rename");
        assert_eq!(config.websocket_url(), "wss://example.com:443/websocket");
    }

    #[test]
    fn test_rejects_bad_addresses() {
        assert!(matches!(
            ClientConfig::new("localhost:3030"),
            Err(ClientError::InvalidAddress(_))
        ));
        assert!(matches!(
            ClientConfig::new("ftp://example.com"),
            Err(ClientError::InvalidAddress(_))
        ));
    }
}
