//! Server side of the courier RPC layer.
//!
//! Provides:
//! - Request dispatcher (queries over `GET`, mutations over `POST`/`PUT`/`DELETE`)
//! - Subscription broker on the `/websocket` socket
//! - `CourierServer` wiring both into an axum router

pub mod config;
mod dispatch;
pub mod server;
mod websocket;

pub use config::ServerConfig;
pub use server::{CourierServer, ServerError};
