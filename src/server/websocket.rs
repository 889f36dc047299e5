//! Push channel delivering telemetry events to viewers
//!
//! Each connection gets its own subscription. The seeded history is flushed
//! first, then live events are forwarded as they arrive. A heartbeat goes out
//! whenever the channel has been idle for the configured interval.
//!
//! Every write races server shutdown and is bounded by the send timeout, so a
//! viewer that stops reading is disconnected instead of pinning its tasks.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dashboard::broadcaster::SubscriptionHandle;
use crate::dashboard::types::Event;
use crate::server::AppState;

/// Lifecycle of one viewer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Registered with the broadcaster, seed not yet flushed
    Subscribed,
    Streaming,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Subscribed) | (Subscribed, Streaming) | (Connecting | Subscribed | Streaming, Closed)
        )
    }

    fn advance(&mut self, next: ConnectionState) {
        if self.can_transition_to(next) {
            *self = next;
        } else {
            tracing::debug!(from = ?self, to = ?next, "Ignoring invalid connection transition");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PushSettings {
    heartbeat_interval: Duration,
    send_timeout: Duration,
    max_message_bytes: usize,
}

/// Upper bound on the courtesy close frame; a stalled viewer never acks it
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a push channel stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Server shutdown or the client went away first
    Cancelled,
    /// Broadcaster dropped the subscription (eviction or stop)
    Unsubscribed,
    /// Write failed or did not complete within the send timeout
    SendFailed,
}

/// Handles WebSocket upgrade requests on `/ws`
///
/// The connection runs in a future tracked by [`AppState::connections`] so
/// server shutdown can wait for every viewer to be torn down. That future
/// only resolves after both of its socket tasks have finished.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let connections = state.connections.clone();
    ws.on_upgrade(move |socket| connections.track_future(handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut connection = ConnectionState::Connecting;
    if state.shutdown.is_cancelled() || state.broadcaster.is_stopped() {
        return;
    }

    let subscription = state.broadcaster.subscribe();
    connection.advance(ConnectionState::Subscribed);

    let id = subscription.id();
    metrics::counter!(crate::metrics::VIEWER_CONNECTIONS).increment(1);
    tracing::info!(
        subscriber_id = %id,
        seeded = subscription.pending_seed(),
        "Viewer connected"
    );

    let settings = PushSettings {
        heartbeat_interval: state.config.streaming.heartbeat_interval(),
        send_timeout: state.config.streaming.send_timeout(),
        max_message_bytes: state.config.streaming.max_message_bytes,
    };
    let closed = state.shutdown.child_token();
    let (sender, receiver) = socket.split();

    let mut send_task = tokio::spawn(forward_events(
        sender,
        subscription,
        settings,
        connection,
        closed.clone(),
    ));
    let mut recv_task = tokio::spawn(read_client(receiver));

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            closed.cancel();
            let _ = send_task.await;
        }
    }

    tracing::info!(subscriber_id = %id, "Viewer disconnected");
}

/// Owns the subscription; dropping it on return unsubscribes the viewer.
async fn forward_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut subscription: SubscriptionHandle,
    settings: PushSettings,
    mut connection: ConnectionState,
    closed: CancellationToken,
) -> ConnectionState {
    let id = subscription.id();
    let streamed = stream_events(
        &mut sender,
        &mut subscription,
        settings,
        &mut connection,
        &closed,
    )
    .await;
    let exit = streamed.err().unwrap_or(Exit::Cancelled);
    drop(subscription);

    if exit == Exit::SendFailed {
        tracing::warn!(
            subscriber_id = %id,
            "Viewer stopped accepting events, dropping connection"
        );
    } else {
        let _ = tokio::time::timeout(CLOSE_FRAME_TIMEOUT, sender.send(Message::Close(None))).await;
    }

    connection.advance(ConnectionState::Closed);
    tracing::debug!(subscriber_id = %id, ?exit, "Push channel closed");
    connection
}

async fn stream_events(
    sender: &mut SplitSink<WebSocket, Message>,
    subscription: &mut SubscriptionHandle,
    settings: PushSettings,
    connection: &mut ConnectionState,
    closed: &CancellationToken,
) -> Result<(), Exit> {
    for event in subscription.take_seed() {
        send_event(sender, &event, settings, closed).await?;
    }
    connection.advance(ConnectionState::Streaming);

    let mut heartbeat_at = Instant::now() + settings.heartbeat_interval;
    loop {
        tokio::select! {
            _ = closed.cancelled() => return Ok(()),
            next = subscription.recv() => {
                let event = next.ok_or(Exit::Unsubscribed)?;
                send_event(sender, &event, settings, closed).await?;
            }
            _ = tokio::time::sleep_until(heartbeat_at) => {
                send_event(sender, &Event::heartbeat(), settings, closed).await?;
            }
        }
        heartbeat_at = Instant::now() + settings.heartbeat_interval;
    }
}

/// Writes one event, giving up when the connection is cancelled or the write
/// stays blocked past the send timeout. Oversized events are skipped.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &Event,
    settings: PushSettings,
    closed: &CancellationToken,
) -> Result<(), Exit> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(kind = %event.kind, error = %e, "Failed to serialize event");
            return Ok(());
        }
    };

    if json.len() > settings.max_message_bytes {
        // Skip rather than truncate so the viewer never sees malformed JSON
        tracing::warn!(
            kind = %event.kind,
            size = json.len(),
            limit = settings.max_message_bytes,
            "Event exceeds message size limit, skipping"
        );
        return Ok(());
    }

    tokio::select! {
        _ = closed.cancelled() => Err(Exit::Cancelled),
        sent = tokio::time::timeout(settings.send_timeout, sender.send(Message::Text(json))) => {
            match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) | Err(_) => Err(Exit::SendFailed),
            }
        }
    }
}

/// Client frames are only read to detect close; content is ignored.
async fn read_client(mut receiver: SplitStream<WebSocket>) {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Text(text) => {
                tracing::debug!(len = text.len(), "Ignoring client message");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(Connecting.can_transition_to(Subscribed));
        assert!(Subscribed.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Closed));
    }

    #[test]
    fn test_any_open_state_can_close() {
        for state in [Connecting, Subscribed, Streaming] {
            assert!(state.can_transition_to(Closed));
        }
    }

    #[test]
    fn test_backward_and_skipping_transitions_rejected() {
        assert!(!Streaming.can_transition_to(Subscribed));
        assert!(!Connecting.can_transition_to(Streaming));
        assert!(!Closed.can_transition_to(Streaming));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_advance_ignores_invalid_transition() {
        let mut state = Closed;
        state.advance(Streaming);
        assert_eq!(state, Closed);

        let mut state = Connecting;
        state.advance(Subscribed);
        state.advance(Streaming);
        assert_eq!(state, Streaming);
    }
}
