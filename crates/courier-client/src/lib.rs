//! Client side of the courier RPC layer.
//!
//! Provides:
//! - `query` / `mutate` over HTTP, returning the server's [`courier_core::Reply`]
//! - `subscribe` over the shared `/websocket` socket, with a [`Subscriber`]
//!   handle for broadcasting to the route's handler

pub mod client;
pub mod config;
mod connection;
pub mod invoker;
mod subscriber;

pub use client::{Client, ClientError};
pub use config::ClientConfig;
pub use connection::ConnectionState;
pub use invoker::Invoker;
pub use subscriber::Subscriber;
