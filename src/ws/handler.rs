//! WebSocket endpoint: JWT handshake, then a subscribe/unsubscribe loop with
//! room-filtered event delivery.

use crate::auth::jwt::{Claims, TokenType};
use crate::error::AppError;
use crate::state::AppState;
use crate::ws::hub::{entity_room, record_room, role_room, user_room, Hub};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe { entity: String, id: Option<i64> },
    Unsubscribe { entity: String, id: Option<i64> },
}

fn frame(event: &str, data: Value) -> Message {
    Message::Text(json!({ "event": event, "data": data }).to_string())
}

/// Token from the Authorization header or `?token=` query, verified before
/// the upgrade completes.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::to_string)
        .or_else(|| params.get("token").cloned())
        .ok_or_else(|| AppError::Unauthorized("authentication required".into()))?;
    let claims = state.tokens.verify(&token)?;
    if claims.token_type != TokenType::Access {
        return Err(AppError::Unauthorized("access token required".into()));
    }
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, claims)))
}

async fn handle_socket(socket: WebSocket, hub: Hub, claims: Claims) {
    let user_id = claims.sub;
    tracing::debug!(user = user_id, "websocket connected");

    let rooms: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::from([
        user_room(user_id),
        role_room(&claims.role),
    ])));

    let mut events = hub.subscribe();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let (mut sink, mut stream) = socket.split();

    let send_rooms = Arc::clone(&rooms);
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(user = user_id, skipped, "websocket receiver lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if event.exclude_user == Some(user_id) {
                        continue;
                    }
                    let joined = {
                        let rooms = send_rooms.lock().expect("rooms lock");
                        event.rooms.iter().any(|r| rooms.contains(r))
                    };
                    if !joined {
                        continue;
                    }
                    if sink.send(frame(&event.event, event.data)).await.is_err() {
                        break;
                    }
                }
                out = out_rx.recv() => {
                    match out {
                        Some(msg) => {
                            if sink.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let recv_rooms = Arc::clone(&rooms);
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { entity, id }) => {
                    let mut rooms = recv_rooms.lock().expect("rooms lock");
                    rooms.insert(entity_room(&entity));
                    if let Some(id) = id {
                        rooms.insert(record_room(&entity, id));
                    }
                    drop(rooms);
                    let _ = out_tx.send(frame("subscribed", json!({ "entity": entity, "id": id })));
                }
                Ok(ClientMessage::Unsubscribe { entity, id }) => {
                    let mut rooms = recv_rooms.lock().expect("rooms lock");
                    match id {
                        Some(id) => {
                            rooms.remove(&record_room(&entity, id));
                        }
                        None => {
                            rooms.remove(&entity_room(&entity));
                        }
                    }
                    drop(rooms);
                    let _ = out_tx.send(frame("unsubscribed", json!({ "entity": entity, "id": id })));
                }
                Err(e) => {
                    let _ = out_tx.send(frame("error", json!({ "message": format!("invalid message: {}", e) })));
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::debug!(user = user_id, "websocket disconnected");
}
