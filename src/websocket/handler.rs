//! WebSocket upgrade and session lifecycle

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::connection::ConnectionManager;
use super::messages::{ClientMessage, WsMessage};
use crate::gateway::state::AppState;
use crate::models::UserId;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// Endpoint: `GET /ws?token=<jwt>`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let actor = match state.tokens.verify(&params.token) {
        Ok(actor) => actor,
        Err(e) => {
            tracing::debug!(error = %e, "WebSocket token rejected");
            return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
        }
    };
    let manager = state.ws_manager.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, actor.user_id, manager))
}

fn encode(msg: &WsMessage) -> Option<String> {
    serde_json::to_string(msg)
        .inspect_err(|e| tracing::error!(error = %e, "WsMessage serialization failed"))
        .ok()
}

async fn handle_socket(socket: WebSocket, user_id: UserId, manager: Arc<ConnectionManager>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let conn_id = manager.add_connection(user_id, tx.clone());

    if let Some(welcome) = encode(&WsMessage::Connected { user_id }) {
        let _ = sender.send(Message::Text(welcome.into())).await;
    }

    // Channel -> socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Socket -> control replies
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::Ping) => WsMessage::Pong,
                        Err(_) => WsMessage::Error {
                            message: "unsupported message".to_string(),
                        },
                    };
                    if let Some(frame) = encode(&reply)
                        && tx.send(frame).is_err()
                    {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    manager.remove_connection(user_id, conn_id);
}
