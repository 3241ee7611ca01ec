//! The client facade.

use std::sync::{Arc, OnceLock};

use courier_core::{ControlFrame, EventStream, Listener, Reply, listener};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{ClientConfig, ConnectionState, Invoker, Subscriber, connection::Connection};

/// Errors from the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode reply: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to encode data: {0}")]
    Encode(serde_json::Error),
}

/// Talks to one courier server.
///
/// Queries and mutations are plain HTTP requests. Subscriptions share a
/// single socket, opened by the first [`Client::subscribe`]; pushes are
/// fanned out to listeners through an [`EventStream`] keyed by route.
pub struct Client {
    config: Arc<ClientConfig>,
    invoker: Invoker,
    events: EventStream<Value>,
    connection: OnceLock<Arc<Connection>>,
}

impl Client {
    /// Client for the server at `address`, e.g. `http://127.0.0.1:3030`.
    ///
    /// # Errors
    /// Returns error if the address is not an http(s) URL.
    pub fn new(address: &str) -> Result<Self, ClientError> {
        Self::with_http_client(address, reqwest::Client::new())
    }

    /// Like [`Client::new`] with a preconfigured HTTP client.
    ///
    /// # Errors
    /// Returns error if the address is not an http(s) URL.
    pub fn with_http_client(address: &str, http: reqwest::Client) -> Result<Self, ClientError> {
        let config = Arc::new(ClientConfig::new(address)?);
        Ok(Self {
            invoker: Invoker::new(http, Arc::clone(&config)),
            config,
            events: EventStream::new(),
            connection: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a query. See [`Invoker::query`].
    ///
    /// # Errors
    /// Returns error if the request fails or the body is not a reply.
    pub async fn query<A, T>(&self, route: &str, args: &A) -> Result<Reply<T>, ClientError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.invoker.query(route, args).await
    }

    /// Run a mutation. See [`Invoker::mutate`].
    ///
    /// # Errors
    /// Returns error if the request fails or the body is not a reply.
    pub async fn mutate<A, T>(&self, route: &str, args: &A) -> Result<Reply<T>, ClientError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.invoker.mutate(route, args).await
    }

    /// Subscribe to `route`, decoding each push as `T` for `on_data`.
    ///
    /// Pushes that do not decode as `T` are logged and skipped.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime when the socket is not yet open.
    pub fn subscribe<T, F>(&self, route: &str, on_data: F) -> Subscriber
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let route_name = route.to_string();
        let typed = listener(move |value: &Value| {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(data) => on_data(data),
                Err(e) => tracing::warn!(route = route_name, "Push did not decode: {e}"),
            }
        });
        self.subscribe_with(route, Some(typed))
    }

    /// Subscribe to `route`, optionally registering a raw listener.
    ///
    /// The listener is registered before the subscribe frame is queued, so
    /// it sees the first push. Calling this again for the same route adds
    /// another listener; the server starts the handler only once per socket.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime when the socket is not yet open.
    pub fn subscribe_with(&self, route: &str, on_data: Option<Listener<Value>>) -> Subscriber {
        if let Some(on_data) = on_data {
            self.events.subscribe(route, on_data);
        }
        let connection = self.connection();
        connection.send(ControlFrame::subscribe(route));
        Subscriber::new(route.to_string(), connection)
    }

    /// Open the socket if needed and wait until it is open or has failed.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime when the socket is not yet open.
    pub async fn connect(&self) -> ConnectionState {
        self.connection().settled().await
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .get()
            .map_or(ConnectionState::Idle, |c| c.state())
    }

    /// The multiplexer pushes are delivered through, keyed by route.
    #[must_use]
    pub const fn events(&self) -> &EventStream<Value> {
        &self.events
    }

    fn connection(&self) -> Arc<Connection> {
        Arc::clone(self.connection.get_or_init(|| {
            tracing::debug!(url = self.config.websocket_url(), "Opening WebSocket");
            Arc::new(Connection::open(
                self.config.websocket_url().to_string(),
                self.events.clone(),
            ))
        }))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base", &self.config.base())
            .field("connection", &self.connection_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_address() {
        assert!(matches!(
            Client::new("not a url"),
            Err(ClientError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_socket_is_lazy() {
        let client = Client::new("http://127.0.0.1:9").unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }
}
