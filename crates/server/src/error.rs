use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Errors surfaced by the collaboration engine.
///
/// A version conflict is deliberately NOT here: it is a normal,
/// signaled outcome carried in a `VERSION_CONFLICT` broadcast. Invalid
/// operations are dropped per-op with a warn log and never fail their
/// batch.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("request is not authenticated")]
    Unauthenticated,
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),
    #[error("user {0} not found")]
    UserNotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CollabError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::DocumentNotFound(_) | Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CollabError {
    fn into_response(self) -> Response {
        // Storage details stay in the logs, not in client responses.
        let message = match &self {
            Self::Storage(error) => {
                tracing::error!(error = ?error, "storage failure surfaced to client");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            self.status(),
            Json(json!({
                "error": {
                    "code": self.code(),
                    "message": message,
                }
            })),
        )
            .into_response()
    }
}
