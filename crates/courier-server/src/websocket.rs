//! Subscription broker on the WebSocket transport.

use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use courier_core::{
    ControlFrame, InvokeError, Namespace, Publisher, PushFrame, RouteTable,
    protocol::{self, ControlKind},
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::Instrument;
use uuid::Uuid;

/// WebSocket upgrade handler.
///
/// Mounted at `/websocket` only when the route table has subscriptions.
pub(crate) async fn ws_handler<C>(
    ws: WebSocketUpgrade,
    State(routes): State<Arc<RouteTable<C>>>,
) -> impl IntoResponse
where
    C: Send + Sync + 'static,
{
    let id = Uuid::new_v4();
    ws.on_upgrade(move |socket| {
        let (broker, outbound) = Broker::new(id, routes);
        handle_socket(socket, broker, outbound)
            .instrument(tracing::info_span!("websocket", connection = %id))
    })
}

async fn handle_socket<C>(
    socket: WebSocket,
    mut broker: Broker<C>,
    mut rx: mpsc::UnboundedReceiver<PushFrame>,
) where
    C: Send + Sync + 'static,
{
    let (mut sender, mut receiver) = socket.split();
    tracing::info!("WebSocket connected");

    // Spawn task to forward frames to WebSocket
    let send_task = tokio::spawn(
        async move {
            while let Some(frame) = rx.recv().await {
                let json = match protocol::encode(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize frame: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    // Handle incoming frames
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        broker.handle_text(&text);
    }

    drop(broker);
    send_task.abort();
    tracing::info!("WebSocket disconnected");
}

/// Per-connection subscription state.
///
/// Handler tasks are owned by the broker and aborted when it is dropped,
/// which happens when the connection ends.
pub(crate) struct Broker<C> {
    id: Uuid,
    routes: Arc<RouteTable<C>>,
    tx: mpsc::UnboundedSender<PushFrame>,
    subscribed: HashSet<String>,
    handlers: JoinSet<()>,
}

impl<C> Broker<C>
where
    C: Send + Sync + 'static,
{
    /// Create a broker and the receiving end of its outbound frame queue.
    ///
    /// Whoever writes to the socket owns the receiver; once it is dropped
    /// every publisher of this connection reports closed.
    pub(crate) fn new(
        id: Uuid,
        routes: Arc<RouteTable<C>>,
    ) -> (Self, mpsc::UnboundedReceiver<PushFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Self {
            id,
            routes,
            tx,
            subscribed: HashSet::new(),
            handlers: JoinSet::new(),
        };
        (broker, rx)
    }

    /// Decode and act on one inbound text frame.
    pub(crate) fn handle_text(&mut self, text: &str) {
        self.reap();

        let frame: ControlFrame = match protocol::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Invalid client frame: {e}");
                return;
            }
        };

        match frame.payload.kind {
            ControlKind::Subscribe => self.subscribe(frame.route),
            ControlKind::Broadcast => {
                let data = frame.payload.data.unwrap_or(Value::Null);
                self.start(frame.route, Some(data));
            }
        }
    }

    fn subscribe(&mut self, route: String) {
        if !self.routes.contains(Namespace::Subscription, &route) {
            tracing::warn!(route, "Subscribe to unknown route");
            return;
        }
        if self.subscribed.contains(&route) {
            tracing::debug!(route, "Already subscribed on this connection");
            return;
        }
        self.subscribed.insert(route.clone());
        self.start(route, None);
    }

    fn start(&mut self, route: String, data: Option<Value>) {
        let publisher = Publisher::new(route.clone(), self.tx.clone());
        match self.routes.start_subscription(&route, publisher, data) {
            Some(Ok(handler)) => {
                tracing::debug!(connection = %self.id, route, "Starting subscription handler");
                self.handlers.spawn(handler);
            }
            Some(Err(InvokeError::InvalidInput(e))) => {
                tracing::warn!(route, "Invalid broadcast data: {e}");
            }
            Some(Err(e)) => tracing::warn!(route, "Failed to start subscription: {e}"),
            None => tracing::warn!(route, "Broadcast to unknown route"),
        }
    }

    /// Collect handlers that already finished.
    fn reap(&mut self) {
        while let Some(result) = self.handlers.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!("Subscription handler panicked: {e}");
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn running(&mut self) -> usize {
        self.reap();
        self.handlers.len()
    }
}
