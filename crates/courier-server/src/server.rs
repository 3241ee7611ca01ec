//! `CourierServer`: axum HTTP + WebSocket server over a route table.

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use courier_core::{Namespace, RouteTable, WEBSOCKET_PATH};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::ServerConfig, dispatch, websocket};

/// Server error.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// RPC server exposing one route table.
pub struct CourierServer<C> {
    config: ServerConfig,
    routes: Arc<RouteTable<C>>,
}

impl<C> CourierServer<C>
where
    C: Send + Sync + 'static,
{
    /// Create a new server.
    #[must_use]
    pub fn new(config: ServerConfig, routes: RouteTable<C>) -> Self {
        Self {
            config,
            routes: Arc::new(routes),
        }
    }

    /// Build the axum router.
    ///
    /// The subscription socket is only mounted when there is at least one
    /// subscription; every other path goes to the request dispatcher.
    /// Request bodies are buffered whole, with no size limit.
    pub fn router(&self) -> Router {
        let mut router = Router::new();

        if self.routes.has_subscriptions() {
            let shadowed = WEBSOCKET_PATH.trim_start_matches('/');
            if self.routes.contains(Namespace::Query, shadowed) {
                tracing::warn!(route = shadowed, "Query is unreachable behind the subscription socket");
            }
            router = router.route(
                WEBSOCKET_PATH,
                get(websocket::ws_handler::<C>).fallback(dispatch::dispatch::<C>),
            );
        }

        router
            .fallback(dispatch::dispatch::<C>)
            .with_state(Arc::clone(&self.routes))
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve in the background.
    ///
    /// Returns the bound address (useful with port `0`) and the task handle.
    ///
    /// # Errors
    /// Returns error if the address is invalid or cannot be bound.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = TcpListener::bind(self.config.socket_addr()?).await?;
        let addr = listener.local_addr()?;
        let app = self.router();

        tracing::info!("Server listening on http://{addr}");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Server error: {e}");
            }
        });
        Ok((addr, handle))
    }

    /// Bind the configured address and serve until the server fails.
    ///
    /// # Errors
    /// Returns error if binding or serving fails.
    pub async fn serve(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.socket_addr()?).await?;
        tracing::info!("Server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Get the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the route table.
    #[must_use]
    pub const fn routes(&self) -> &Arc<RouteTable<C>> {
        &self.routes
    }
}
