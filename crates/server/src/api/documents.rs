// REST surface for document lifecycle bits the socket protocol does
// not cover: deleting a document and inspecting a roster.

use crate::auth::jwt::JwtAccessTokenService;
use crate::auth::middleware::require_bearer_auth;
use crate::broadcast::Broadcaster;
use crate::error::CollabError;
use crate::presence::PresenceTracker;
use crate::store::DocumentStore;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::jwt::AuthenticatedPrincipal;

#[derive(Clone)]
pub struct DocumentsApiState {
    pub docs: DocumentStore,
    pub presence: Arc<PresenceTracker>,
    pub broadcast: Broadcaster,
}

pub fn router(jwt_service: Arc<JwtAccessTokenService>, state: DocumentsApiState) -> Router {
    let auth_layer = middleware::from_fn_with_state(jwt_service, require_bearer_auth);

    Router::new()
        .route(
            "/v1/documents/{document_id}",
            delete(delete_document).put(update_document),
        )
        .route("/v1/documents/{document_id}/active-users", get(list_active_users))
        .layer(auth_layer)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentRequest {
    pub content: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Replace a document's content wholesale (restore, import, save
/// outside the operation path) and notify subscribed editors with a
/// full-content update.
async fn update_document(
    Path(document_id): Path<Uuid>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    State(state): State<DocumentsApiState>,
    Json(payload): Json<UpdateDocumentRequest>,
) -> Result<impl IntoResponse, CollabError> {
    let mut document = state
        .docs
        .load_by_id(document_id)
        .await?
        .ok_or(CollabError::DocumentNotFound(document_id))?;

    document.content = payload.content;
    document.updated_at = Utc::now();
    let document = state.docs.save(&document).await?;

    let client_id = payload
        .client_id
        .unwrap_or_else(|| format!("server-update-{}", Uuid::new_v4()));
    state.broadcast.notify_document_update(&document, principal.user_id, client_id).await;

    Ok(Json(document))
}

/// Delete a document, tell connected editors, and drop its presence
/// state. The deleted broadcast only goes out when someone is still in
/// the document.
async fn delete_document(
    Path(document_id): Path<Uuid>,
    State(state): State<DocumentsApiState>,
) -> Result<impl IntoResponse, CollabError> {
    let document = state
        .docs
        .load_by_id(document_id)
        .await?
        .ok_or(CollabError::DocumentNotFound(document_id))?;

    state.docs.delete_by_id(document.id).await?;
    info!(%document_id, "document deleted");

    let roster = state.presence.list_active_users(document_id, None).await;
    if !roster.is_empty() {
        state.broadcast.notify_document_deleted(document_id).await;
    }
    state.presence.purge_document(document_id).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_active_users(
    Path(document_id): Path<Uuid>,
    State(state): State<DocumentsApiState>,
) -> impl IntoResponse {
    Json(state.presence.list_active_users(document_id, None).await)
}
