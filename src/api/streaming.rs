use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::handler::AppState;
use crate::reconciler::{ActionTracker, ActionUpdate};

/// Stream an action's reconciliation progress over WebSocket
/// GET /api/v1/actions/:id/stream
///
/// Sends the latest known update immediately, then every subsequent
/// transition until the action reaches a terminal state. A client that
/// disconnects merely stops observing; the reconciler runs to completion
/// regardless.
pub async fn stream_action(
    ws: WebSocketUpgrade,
    Path(action_id): Path<Uuid>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_action_stream(socket, state.tracker.clone(), action_id))
}

async fn handle_action_stream(socket: WebSocket, tracker: Arc<ActionTracker>, action_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let Some((latest, mut updates)) = tracker.subscribe(action_id) else {
        let _ = sender
            .send(Message::Close(None))
            .await;
        return;
    };

    if send_update(&mut sender, &latest).await.is_err() {
        return;
    }
    if latest.is_terminal() {
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(update) => {
                        let terminal = update.is_terminal();
                        if send_update(&mut sender, &update).await.is_err() {
                            return;
                        }
                        if terminal {
                            let _ = sender.send(Message::Close(None)).await;
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Intermediate transitions dropped; the next recv
                        // still yields the freshest update
                        warn!("Stream for {} lagged by {} updates", action_id, skipped);
                    }
                    Err(RecvError::Closed) => {
                        let _ = sender.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client left stream for action {}", action_id);
                        return;
                    }
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
        }
    }
}

async fn send_update(
    sender: &mut SplitSink<WebSocket, Message>,
    update: &ActionUpdate,
) -> Result<(), ()> {
    let payload = match serde_json::to_string(update) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to serialize action update: {}", e);
            return Err(());
        }
    };
    sender
        .send(Message::Text(payload))
        .await
        .map_err(|_| ())
}
