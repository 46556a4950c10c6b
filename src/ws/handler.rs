use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use super::{Channel, Subscription, WsMessage};
use crate::AppState;
use crate::domain::DecisionQuery;
use crate::error::Result;

/// Live updates for one channel (`decisions` or `hosts`)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<Arc<AppState>>,
) -> std::result::Result<impl IntoResponse, StatusCode> {
    let channel: Channel = channel.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    tracing::info!(channel = %channel, "WebSocket connection established");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, channel)))
}

/// Current state of a channel, serialized the same way the sync broadcasts it
async fn snapshot(state: &AppState, channel: Channel) -> Result<String> {
    let message = match channel {
        Channel::Decisions => WsMessage::Decisions(
            state
                .repo
                .list_decisions(&DecisionQuery {
                    active: Some(true),
                    ..Default::default()
                })
                .await?,
        ),
        Channel::Hosts => WsMessage::Hosts(state.repo.list_hosts().await?),
    };
    Ok(serde_json::to_string(&message)?)
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, channel: Channel) {
    // subscribe first so nothing broadcast during the snapshot is lost
    let Subscription { id, mut rx, .. } = state.broadcaster.subscribe(channel);
    let (mut sender, mut receiver) = socket.split();

    let initial = match snapshot(&state, channel).await {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(channel = %channel, error = %e, "failed to build WebSocket snapshot");
            state.broadcaster.unsubscribe(channel, id);
            return;
        }
    };

    // Send task: snapshot, then every broadcast frame
    let mut send_task = tokio::spawn(async move {
        if sender.send(Message::Text(initial.into())).await.is_err() {
            return;
        }
        while let Some(frame) = rx.recv().await {
            if sender
                .send(Message::Text(frame.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
        tracing::debug!(channel = %channel, "subscription ended");
    });

    // Recv task: client messages are ignored, close or error ends the session
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    tracing::debug!("WebSocket client sent close");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcaster.unsubscribe(channel, id);
    tracing::info!(channel = %channel, "WebSocket connection closed");
}
