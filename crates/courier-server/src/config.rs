//! Server configuration.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::ServerError;

/// Environment variable overriding the bind host.
pub const HOST_ENV: &str = "COURIER_HOST";
/// Environment variable overriding the bind port.
pub const PORT_ENV: &str = "COURIER_PORT";

/// Configuration for a courier server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `COURIER_HOST` and `COURIER_PORT`.
    ///
    /// # Errors
    /// Returns error if `COURIER_PORT` is set but not a port number.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Some(host) = lookup(HOST_ENV) {
            config.host = host;
        }
        if let Some(port) = lookup(PORT_ENV) {
            config.port = port
                .parse()
                .map_err(|_| ServerError::InvalidConfig(format!("{PORT_ENV}={port}")))?;
        }
        Ok(config)
    }

    /// Socket address to bind.
    ///
    /// # Errors
    /// Returns error if the host is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ServerError::InvalidConfig(format!("host {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
