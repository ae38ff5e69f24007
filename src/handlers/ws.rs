//! WebSocket gateway: upgrade, three-location token resolution, and the
//! per-connection inbound/outbound loop.
//!
//! One task per connection, structured like the teacher's per-client
//! read/write loop: a `tokio::select!` between the connection's own outbox
//! (fed by `ConnectionManager::send_to_user`, used for replies targeted at
//! this device) and the socket's inbound stream, with a dedicated forwarder
//! task per joined room feeding the same outbox from the pub/sub fabric.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::security::{OperationClass, RateLimitOutcome};
use crate::state::{AppState, ClientEvent, ServerEvent};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}

fn personal_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

fn conversation_room(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// The only shape a pre-auth handshake frame can take: a bare token field,
/// sent as the connection's first text frame by clients that can set
/// neither a query parameter nor an `Authorization` header.
#[derive(Deserialize)]
struct HandshakeAuth {
    token: String,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let header_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    // Priority: Authorization header, then query string, then a first-frame
    // handshake payload (resolved once the socket is actually open, inside
    // `handle_socket`).
    let token = header_token.or(query.token);

    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Spawn a task that forwards every payload published to `room` into
/// `connection_id`'s outbox, deserializing back into a `ServerEvent`.
fn spawn_room_forwarder(state: &AppState, user_id: String, connection_id: u64, room: String) -> JoinHandle<()> {
    let mut rx = state.pubsub.subscribe(&room);
    let connections = state.connections.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(payload) => {
                    if let Ok(event) = serde_json::from_str::<ServerEvent>(&payload) {
                        connections.send_to_connection(&user_id, connection_id, event);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn handle_socket(mut socket: WebSocket, state: AppState, mut token: Option<String>) {
    if token.is_none() {
        token = match tokio::time::timeout(Duration::from_secs(5), socket.recv()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                serde_json::from_str::<HandshakeAuth>(&text).ok().map(|a| a.token)
            }
            _ => None,
        };
    }

    let Some(token) = token else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let user_id = match state.tokens.verify_access(&token) {
        Ok(claims) => claims.sub,
        Err(_) => {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let hide_read_status = state
        .db
        .users()
        .find_by_id(&user_id)
        .await
        .ok()
        .flatten()
        .map(|u| u.hide_read_status)
        .unwrap_or(false);

    let (connection_id, mut outbox) = state.connections.register(&user_id);
    state.online_users.lock().await.insert(user_id.clone());
    if let Err(err) = state.engines.presence.connect(&user_id).await {
        tracing::warn!(user_id, error = %err, "presence connect failed");
    }
    crate::metrics::CONNECTED_CLIENTS.inc();
    if state.connections.connection_count(&user_id) == 1 {
        crate::metrics::ONLINE_USERS.inc();
    }

    let mut room_tasks: HashMap<String, JoinHandle<()>> = HashMap::new();
    let personal = personal_room(&user_id);
    room_tasks.insert(
        personal.clone(),
        spawn_room_forwarder(&state, user_id.clone(), connection_id, personal.clone()),
    );

    let auth_event = ServerEvent::AuthSuccess { user_id: user_id.clone(), session_id: connection_id.to_string() };
    if socket.send(to_ws_message(&auth_event)).await.is_err() {
        finish_connection(&state, &user_id, connection_id, room_tasks).await;
        return;
    }

    let heartbeat_timeout = Duration::from_secs(state.config.presence.heartbeat_interval_secs.max(1) * 2);

    loop {
        tokio::select! {
            outbound = outbox.recv() => {
                match outbound {
                    Some(event) => {
                        let is_force_disconnect = matches!(event, ServerEvent::ForceDisconnect { .. });
                        let sent = socket.send(to_ws_message(&event)).await.is_ok();
                        if !sent || is_force_disconnect {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = tokio::time::timeout(heartbeat_timeout, socket.recv()) => {
                match incoming {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if !handle_client_event(&state, &user_id, connection_id, hide_read_status, &text, &mut room_tasks).await {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Err(_))) => break,
                    Ok(Some(Ok(_))) => {}
                    Err(_) => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    finish_connection(&state, &user_id, connection_id, room_tasks).await;
}

async fn finish_connection(
    state: &AppState,
    user_id: &str,
    connection_id: u64,
    room_tasks: HashMap<String, JoinHandle<()>>,
) {
    for (room, task) in room_tasks {
        task.abort();
        state.pubsub.unsubscribe(&room);
    }
    state.connections.unregister(user_id, connection_id);
    crate::metrics::CONNECTED_CLIENTS.dec();
    if !state.connections.is_online_locally(user_id) {
        crate::metrics::ONLINE_USERS.dec();
        state.online_users.lock().await.remove(user_id);
        if let Err(err) = state.engines.presence.disconnect(user_id).await {
            tracing::warn!(user_id, error = %err, "presence disconnect failed");
        }
    }
}

fn to_ws_message(event: &ServerEvent) -> Message {
    match serde_json::to_string(event) {
        Ok(json) => Message::Text(json.into()),
        Err(_) => Message::Close(None),
    }
}

fn error_event(temp_id: Option<String>, err: &AppError) -> ServerEvent {
    ServerEvent::MessageError {
        temp_id,
        code: err.code().to_string(),
        message: err.to_string(),
        retry_after: err.retry_after_ms(),
    }
}

/// Dispatch one inbound frame. Returns `false` if the connection should be
/// torn down (malformed frame past what a client error event can express).
async fn handle_client_event(
    state: &AppState,
    user_id: &str,
    connection_id: u64,
    hide_read_status: bool,
    text: &str,
    room_tasks: &mut HashMap<String, JoinHandle<()>>,
) -> bool {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(_) => {
            state.connections.send_to_connection(
                user_id,
                connection_id,
                error_event(None, &AppError::InvalidPayload),
            );
            return true;
        }
    };

    match event {
        ClientEvent::MessageSend { conversation_id, content, temp_id } => {
            match state.engines.message.send(user_id, &conversation_id, &content, temp_id.clone()).await {
                Ok(_) => {
                    let room = conversation_room(&conversation_id);
                    room_tasks.entry(room.clone()).or_insert_with(|| {
                        spawn_room_forwarder(state, user_id.to_string(), connection_id, room)
                    });
                }
                Err(err) => {
                    state.connections.send_to_connection(user_id, connection_id, error_event(temp_id, &err));
                }
            }
        }
        ClientEvent::MessageEdit { message_id, content } => {
            if let Err(err) = state.engines.message.edit(user_id, &message_id, &content).await {
                state.connections.send_to_connection(user_id, connection_id, error_event(None, &err));
            }
        }
        ClientEvent::MessageDelete { message_id } => {
            if let Err(err) = state.engines.message.delete(user_id, &message_id).await {
                state.connections.send_to_connection(user_id, connection_id, error_event(None, &err));
            }
        }
        ClientEvent::MessageDelivered { message_ids } => {
            if let Err(err) = state.engines.message.mark_delivered(user_id, &message_ids).await {
                state.connections.send_to_connection(user_id, connection_id, error_event(None, &err));
            }
        }
        ClientEvent::MessageRead { conversation_id, message_ids } => {
            let result = state
                .engines
                .message
                .mark_read(user_id, hide_read_status, conversation_id.as_deref(), message_ids.as_deref())
                .await;
            if let Err(err) = result {
                state.connections.send_to_connection(user_id, connection_id, error_event(None, &err));
            }
        }
        ClientEvent::ConversationJoin { conversation_id } => {
            let participant = state.db.conversations().find_participant(&conversation_id, user_id).await;
            match participant {
                Ok(Some(p)) if p.is_active() => {
                    let room = conversation_room(&conversation_id);
                    room_tasks.entry(room.clone()).or_insert_with(|| {
                        spawn_room_forwarder(state, user_id.to_string(), connection_id, room)
                    });
                }
                Ok(_) => {
                    state.connections.send_to_connection(user_id, connection_id, error_event(None, &AppError::NotParticipant));
                }
                Err(err) => {
                    state.connections.send_to_connection(user_id, connection_id, error_event(None, &AppError::from(err)));
                }
            }
        }
        ClientEvent::ConversationLeave { conversation_id } => {
            let room = conversation_room(&conversation_id);
            if let Some(task) = room_tasks.remove(&room) {
                task.abort();
                state.pubsub.unsubscribe(&room);
            }
        }
        ClientEvent::PresenceUpdate { status } => {
            match state.rate_limiter.check(user_id, OperationClass::PresenceUpdate).await {
                RateLimitOutcome::Limited { retry_after_ms } => {
                    state.connections.send_to_connection(
                        user_id,
                        connection_id,
                        error_event(None, &AppError::RateLimited { retry_after_ms }),
                    );
                }
                RateLimitOutcome::Allowed => {
                    if let Err(err) = state.engines.presence.set_status(user_id, status).await {
                        state.connections.send_to_connection(user_id, connection_id, error_event(None, &err));
                    }
                }
            }
        }
        ClientEvent::Heartbeat {} => {
            if let Err(err) = state.engines.presence.heartbeat(user_id).await {
                tracing::warn!(user_id, error = %err, "heartbeat failed");
            }
        }
    }

    true
}
