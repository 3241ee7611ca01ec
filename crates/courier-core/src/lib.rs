//! Core building blocks of the courier RPC layer.
//!
//! This crate provides:
//! - `RouteTable` - Queries, mutations and subscriptions plus shared context
//! - `EventStream` - Topic based listener registry used by clients
//! - `Publisher` - The `send` side handed to subscription handlers
//! - Wire protocol frames and error values

pub mod context;
pub mod error;
pub mod event_stream;
pub mod protocol;
pub mod publisher;
pub mod routes;

pub use context::Context;
pub use error::{HandlerResult, ProtocolError, RpcError, error, error_kind};
pub use event_stream::{EventStream, Listener, listener};
pub use protocol::{ControlFrame, PushFrame, Reply};
pub use publisher::{PublishError, Publisher};
pub use routes::{Handler, InvokeError, Namespace, NoArgs, QueryArgs, RouteTable, RouteTableBuilder};

/// Path the subscription socket is mounted at.
pub const WEBSOCKET_PATH: &str = "/websocket";
