//! Handle returned by a subscription.

use std::sync::Arc;

use courier_core::ControlFrame;
use serde::Serialize;

use crate::{ClientError, connection::Connection};

/// Handle returned by [`crate::Client::subscribe`].
///
/// Cloning shares the same socket. The socket stays open while the client
/// or any handle is alive.
#[derive(Debug, Clone)]
pub struct Subscriber {
    route: String,
    connection: Arc<Connection>,
}

impl Subscriber {
    pub(crate) const fn new(route: String, connection: Arc<Connection>) -> Self {
        Self { route, connection }
    }

    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Send `data` to this route's handler on the server.
    ///
    /// Fire and forget: nothing comes back unless the handler pushes.
    ///
    /// # Errors
    /// Returns error if `data` cannot be encoded as JSON.
    pub fn broadcast<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), ClientError> {
        let data = serde_json::to_value(data).map_err(ClientError::Encode)?;
        self.connection
            .send(ControlFrame::broadcast(self.route.clone(), data));
        Ok(())
    }
}
