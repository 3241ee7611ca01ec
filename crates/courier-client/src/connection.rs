//! Subscription socket.
//!
//! One socket per client, opened on first use. Frames sent before the
//! socket is open wait in the outbound queue and are written in order once
//! it opens. If the socket never opens, or closes later, queued and future
//! frames are dropped.

use courier_core::{
    ControlFrame, EventStream,
    protocol::{self, Push},
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Lifecycle of the subscription socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No subscription has been made yet, so no socket exists.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Frames are flowing.
    Open,
    /// Connect failed or the socket ended.
    Closed,
}

/// Handle to the socket task.
///
/// Dropping the handle stops the task and closes the socket.
#[derive(Debug)]
pub(crate) struct Connection {
    outbound: mpsc::UnboundedSender<ControlFrame>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Spawn the socket task. Pushes are delivered to `events` under their route.
    pub(crate) fn open(url: String, events: EventStream<Value>) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(run(url, rx, state_tx, events));
        Self {
            outbound,
            state,
            task,
        }
    }

    /// Queue a frame for the server.
    pub(crate) fn send(&self, frame: ControlFrame) {
        if let Err(e) = self.outbound.send(frame) {
            tracing::debug!(route = e.0.route, "Socket closed, dropping frame");
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the socket is open or has given up.
    pub(crate) async fn settled(&self) -> ConnectionState {
        let mut state = self.state.clone();
        match state
            .wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Closed))
            .await
        {
            Ok(s) => *s,
            Err(_) => ConnectionState::Closed,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<ControlFrame>,
    state: watch::Sender<ConnectionState>,
    events: EventStream<Value>,
) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::error!(url, "WebSocket connect failed: {e}");
            state.send_replace(ConnectionState::Closed);
            return;
        }
    };
    state.send_replace(ConnectionState::Open);
    tracing::info!(url, "WebSocket connected");

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let json = match protocol::encode(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(route = frame.route, "Failed to serialize frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    tracing::error!("WebSocket send failed: {e}");
                    break;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => deliver(&events, text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => deliver(&events, text),
                    Err(_) => tracing::warn!("Ignoring non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!("WebSocket error: {e}");
                    break;
                }
            },
        }
    }

    state.send_replace(ConnectionState::Closed);
    tracing::info!(url, "WebSocket closed");
}

fn deliver(events: &EventStream<Value>, text: &str) {
    match protocol::decode::<Push>(text) {
        Ok(frame) => {
            let listeners = events.notify(&frame.route, &frame.payload.data);
            tracing::trace!(route = frame.route, listeners, "Push delivered");
        }
        Err(e) => tracing::warn!("Invalid server frame: {e}"),
    }
}
