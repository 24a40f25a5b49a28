//! WebSocket broadcasts of presence status and events
//!
//! `/ws` pushes the flat status object on connect and after every tick.
//! `/ws/events` pushes tagged session and presence events as they happen.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use super::ApiState;

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws", get(status_upgrade))
        .route("/ws/events", get(events_upgrade))
        .with_state(state)
}

async fn status_upgrade(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_status_socket(socket, state))
}

async fn events_upgrade(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events_socket(socket, state))
}

/// Serialize and send one JSON message, returning false once the client is gone
async fn send_json<T: Serialize>(sender: &mut SplitSink<WebSocket, Message>, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize websocket message");
            true
        }
    }
}

/// Stream status snapshots to one client
async fn handle_status_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, receiver) = socket.split();
    let mut status_rx = state.tracker.watch_status();

    let initial = status_rx.borrow_and_update().clone();
    tracing::debug!(?initial, "sending initial status");
    if !send_json(&mut sender, &initial).await {
        return;
    }

    tracing::info!("presence client connected");

    let mut send_task = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            if !send_json(&mut sender, &status).await {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(drain_client(receiver));

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("presence client disconnected");
}

/// Stream presence events to one client
async fn handle_events_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, receiver) = socket.split();
    let mut events_rx = state.tracker.subscribe();

    tracing::info!("event client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => {
                    if !send_json(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event client lagging, dropped events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(drain_client(receiver));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("event client disconnected");
}

/// Read and discard client messages until the socket closes
///
/// Clients only talk to keep the connection alive.
async fn drain_client(mut receiver: futures::stream::SplitStream<WebSocket>) {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => tracing::trace!(len = text.len(), "ignoring client message"),
            Message::Close(_) => break,
            _ => {}
        }
    }
}
