// WebSocket gateway for collaborative document sessions.
//
// One socket per authenticated user; the socket multiplexes any number
// of document sessions. Inbound frames are `ClientMessage`; everything
// outbound is an `Envelope` (destination + message) pushed through the
// session's unbounded channel by the broadcast dispatcher.

use super::session::SessionRegistry;
use super::{HEARTBEAT_INTERVAL_MS, HEARTBEAT_TIMEOUT_MS, MAX_FRAME_BYTES};
use crate::auth::jwt::{AuthenticatedPrincipal, JwtAccessTokenService};
use crate::broadcast::Broadcaster;
use crate::error::CollabError;
use crate::presence::PresenceTracker;
use crate::reconcile::UpdateReconciler;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use coedit_common::protocol::ws::{
    decode_client_message, encode_envelope, ClientMessage, Envelope,
};
use coedit_common::types::{DocumentUpdateBatch, EditOperation};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct GatewayState {
    pub jwt: Arc<JwtAccessTokenService>,
    pub registry: Arc<SessionRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub reconciler: Arc<UpdateReconciler>,
    pub broadcast: Broadcaster,
}

pub fn router(state: GatewayState) -> Router {
    Router::new().route("/v1/collab", get(ws_upgrade)).with_state(state)
}

/// Extract the access token from `Authorization: Bearer ...` or, for
/// browser WebSocket clients that cannot set headers, from `?token=`.
fn bearer_or_query_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    query.get("token").filter(|token| !token.is_empty()).cloned()
}

pub async fn ws_upgrade(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(token) = bearer_or_query_token(&headers, &query) else {
        return CollabError::Unauthenticated.into_response();
    };
    let principal = match state.jwt.validate_access_token(&token) {
        Ok(principal) => principal,
        Err(error) => {
            warn!(error = %error, "rejected websocket upgrade with invalid token");
            return CollabError::Unauthenticated.into_response();
        }
    };

    ws.max_frame_size(MAX_FRAME_BYTES as usize)
        .on_upgrade(move |socket| handle_socket(state, principal, socket))
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
        || message.contains("size limit")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes")
                .into(),
        })))
        .await;
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), axum::Error> {
    match encode_envelope(envelope) {
        Ok(encoded) => socket.send(Message::Text(encoded.into())).await,
        Err(error) => {
            warn!(error = %error, "failed to encode outbound envelope");
            Ok(())
        }
    }
}

/// A session times out only when a ping went out and no pong has come
/// back within the window. A client that never sends unsolicited pongs
/// is fine as long as it answers ours.
fn pong_overdue(last_ping: Option<Instant>, last_pong: Instant) -> bool {
    let Some(pinged_at) = last_ping else {
        return false;
    };
    last_pong < pinged_at
        && pinged_at.elapsed() > std::time::Duration::from_millis(HEARTBEAT_TIMEOUT_MS)
}

async fn handle_socket(state: GatewayState, principal: AuthenticatedPrincipal, mut socket: WebSocket) {
    let session_id = Uuid::new_v4();
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<Envelope>();
    state.registry.register(session_id, principal.user_id, outbound_sender).await;
    info!(%session_id, user_id = %principal.user_id, "websocket session opened");

    // Documents this socket has connected to, so a dropped socket
    // still runs the leave flow per document.
    let mut connected_docs: HashSet<Uuid> = HashSet::new();

    let mut heartbeat_interval =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    heartbeat_interval.reset(); // skip immediate first tick
    let mut last_ping: Option<Instant> = None;
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if pong_overdue(last_ping, last_pong) {
                    warn!(%session_id, "heartbeat timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
                last_ping = Some(Instant::now());
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(envelope) => {
                        if send_envelope(&mut socket, &envelope).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        if raw_message.len() > MAX_FRAME_BYTES as usize {
                            close_frame_too_large(&mut socket).await;
                            break;
                        }

                        let inbound = match decode_client_message(&raw_message) {
                            Ok(message) => message,
                            Err(error) => {
                                warn!(%session_id, error = %error, "undecodable client frame");
                                state
                                    .broadcast
                                    .send_error(
                                        principal.user_id,
                                        "INVALID_MESSAGE",
                                        "invalid websocket frame payload".to_string(),
                                    )
                                    .await;
                                continue;
                            }
                        };

                        if let ClientMessage::Connect { document_id } = &inbound {
                            connected_docs.insert(*document_id);
                        }
                        if let ClientMessage::Disconnect { document_id } = &inbound {
                            connected_docs.remove(document_id);
                        }

                        if let Err(error) =
                            dispatch(&state, session_id, &principal, inbound).await
                        {
                            warn!(
                                %session_id,
                                user_id = %principal.user_id,
                                error = %error,
                                "client frame rejected"
                            );
                            state
                                .broadcast
                                .send_error(principal.user_id, error.code(), error.to_string())
                                .await;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        if is_frame_size_violation(&error) {
                            close_frame_too_large(&mut socket).await;
                        }
                        break;
                    }
                }
            }
        }
    }

    // A dropped socket counts as a disconnect from every document it
    // was still in.
    for document_id in connected_docs {
        handle_disconnect(&state, session_id, &principal, document_id).await;
    }
    state.registry.unregister(session_id).await;
    info!(%session_id, user_id = %principal.user_id, "websocket session closed");
}

async fn dispatch(
    state: &GatewayState,
    session_id: Uuid,
    principal: &AuthenticatedPrincipal,
    message: ClientMessage,
) -> Result<(), CollabError> {
    match message {
        ClientMessage::Connect { document_id } => {
            handle_connect(state, session_id, principal, document_id).await
        }
        ClientMessage::Disconnect { document_id } => {
            handle_disconnect(state, session_id, principal, document_id).await;
            Ok(())
        }
        ClientMessage::Typing { document_id, cursor_position, is_typing } => {
            handle_typing(state, principal, document_id, cursor_position, is_typing).await;
            Ok(())
        }
        ClientMessage::Operation { document_id, operation } => {
            handle_operation(state, principal, document_id, operation).await
        }
        ClientMessage::BatchOperations { document_id, batch } => {
            handle_batch(state, principal, document_id, batch).await
        }
    }
}

/// Join a document: presence record, topic subscriptions, a roster
/// broadcast for everyone, a join broadcast when the user is new, and
/// a private ack for the caller.
pub(crate) async fn handle_connect(
    state: &GatewayState,
    session_id: Uuid,
    principal: &AuthenticatedPrincipal,
    document_id: Uuid,
) -> Result<(), CollabError> {
    let is_new = state.presence.connect(document_id, principal.user_id).await?;
    state.registry.subscribe_document(session_id, document_id).await;

    let roster = state.presence.list_active_users(document_id, None).await;
    let joined = roster.iter().find(|user| user.user_id == principal.user_id).cloned();
    state.broadcast.notify_active_users(document_id, roster).await;

    if is_new {
        if let Some(user) = joined {
            state.broadcast.notify_user_joined(document_id, &user).await;
        }
    }

    state.broadcast.send_connected_ack(principal.user_id, document_id).await;
    Ok(())
}

/// Leave a document. Runs on client request and on socket drop; both
/// paths are idempotent.
pub(crate) async fn handle_disconnect(
    state: &GatewayState,
    session_id: Uuid,
    principal: &AuthenticatedPrincipal,
    document_id: Uuid,
) {
    let was_connected = state.presence.is_connected(document_id, principal.user_id).await;
    state.presence.disconnect(document_id, principal.user_id).await;

    if was_connected {
        state
            .broadcast
            .notify_user_left(document_id, principal.user_id, principal.username.clone())
            .await;
        let remaining = state.presence.list_active_users(document_id, None).await;
        state.broadcast.notify_active_users(document_id, remaining).await;
    }

    state.registry.unsubscribe_document(session_id, document_id).await;
}

/// Cursor/typing update. Missing fields leave the stored state alone
/// but the broadcast always carries concrete values.
pub(crate) async fn handle_typing(
    state: &GatewayState,
    principal: &AuthenticatedPrincipal,
    document_id: Uuid,
    cursor_position: Option<u32>,
    is_typing: Option<bool>,
) {
    state
        .presence
        .update_state(document_id, principal.user_id, cursor_position, is_typing)
        .await;
    state
        .broadcast
        .notify_cursor_update(
            document_id,
            principal.user_id,
            cursor_position.unwrap_or(0),
            is_typing.unwrap_or(false),
        )
        .await;
}

/// Single operation: applied as a one-element batch with no staleness
/// baseline, then acked privately.
pub(crate) async fn handle_operation(
    state: &GatewayState,
    principal: &AuthenticatedPrincipal,
    document_id: Uuid,
    operation: EditOperation,
) -> Result<(), CollabError> {
    let client_id = operation.client_id.clone();
    let batch = DocumentUpdateBatch {
        operations: vec![operation.clone()],
        last_known_update: None,
        client_id: client_id.clone(),
    };

    let outcome = state.reconciler.apply(document_id, batch, principal.user_id).await?;
    state
        .broadcast
        .send_operation_ack(
            principal.user_id,
            document_id,
            operation,
            outcome.document.updated_at,
            client_id,
        )
        .await;
    Ok(())
}

/// Batch of operations. On conflict the reconciler already broadcast
/// the server state; the private ack then reports zero applied
/// operations alongside the authoritative content.
pub(crate) async fn handle_batch(
    state: &GatewayState,
    principal: &AuthenticatedPrincipal,
    document_id: Uuid,
    batch: DocumentUpdateBatch,
) -> Result<(), CollabError> {
    let client_id = batch.client_id.clone();
    let outcome = state.reconciler.apply(document_id, batch, principal.user_id).await?;
    state
        .broadcast
        .send_update_ack(
            principal.user_id,
            document_id,
            outcome.applied,
            outcome.document.content.clone(),
            outcome.document.updated_at,
            client_id,
        )
        .await;
    Ok(())
}
