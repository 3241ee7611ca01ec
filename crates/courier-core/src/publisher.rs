//! Outbound half of a subscription: the `send` callback handed to handlers.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::PushFrame;

/// Publish error.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Connection closed")]
    Closed,
    #[error("Failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pushes values for one route down one connection.
///
/// Every value is wrapped as `{route, payload: {data}}` before it is queued
/// on the connection's writer, so frames keep the order they were sent in.
#[derive(Debug, Clone)]
pub struct Publisher {
    route: String,
    tx: mpsc::UnboundedSender<PushFrame>,
}

impl Publisher {
    /// Create a publisher for `route` writing into `tx`.
    #[must_use]
    pub fn new(route: impl Into<String>, tx: mpsc::UnboundedSender<PushFrame>) -> Self {
        Self {
            route: route.into(),
            tx,
        }
    }

    /// Route this publisher tags its frames with.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Push a value to the subscribed client.
    ///
    /// # Errors
    /// Returns error if the value cannot be encoded or the connection is gone.
    pub fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), PublishError> {
        let data = serde_json::to_value(value)?;
        self.tx
            .send(PushFrame::push(self.route.clone(), data))
            .map_err(|_| PublishError::Closed)
    }

    /// Whether the connection behind this publisher has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolve once the connection behind this publisher has gone away.
    ///
    /// Long running handlers can race their work against this to stop
    /// cooperatively.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_send_tags_route() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let publisher = Publisher::new("tick", tx);

        assert_ok!(publisher.send(&1));
        assert_ok!(publisher.send("two"));

        assert_eq!(rx.try_recv().unwrap(), PushFrame::push("tick", json!(1)));
        assert_eq!(rx.try_recv().unwrap(), PushFrame::push("tick", json!("two")));
    }

    #[test]
    fn test_send_after_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = Publisher::new("tick", tx);
        drop(rx);

        assert!(publisher.is_closed());
        let err = assert_err!(publisher.send(&1));
        assert!(matches!(err, PublishError::Closed));
    }

    #[tokio::test]
    async fn test_closed_resolves() {
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = Publisher::new("tick", tx);
        drop(rx);
        publisher.closed().await;
    }
}
