use crate::auth::jwt::{AuthenticatedPrincipal, JwtAccessTokenService};
use crate::error::CollabError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Require a valid bearer token and install the resolved
/// `AuthenticatedPrincipal` as a request extension.
pub async fn require_bearer_auth(
    State(jwt_service): State<Arc<JwtAccessTokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&jwt_service, request.headers()) {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(error) => error.into_response(),
    }
}

fn authenticate(
    jwt_service: &JwtAccessTokenService,
    headers: &HeaderMap,
) -> Result<AuthenticatedPrincipal, CollabError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or(CollabError::Unauthenticated)?;

    jwt_service.validate_access_token(token).map_err(|error| {
        warn!(error = %error, "rejected request with invalid bearer token");
        CollabError::Unauthenticated
    })
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let rest = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::Extension,
        http::{header::AUTHORIZATION, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    const TEST_SECRET: &str = "unit_test_jwt_secret_with_32_chars!!";

    fn jwt() -> Arc<JwtAccessTokenService> {
        Arc::new(JwtAccessTokenService::new(TEST_SECRET).expect("service should initialize"))
    }

    fn protected_app(jwt_service: Arc<JwtAccessTokenService>) -> Router {
        let whoami = |Extension(principal): Extension<AuthenticatedPrincipal>| async move {
            format!("{}:{}", principal.user_id, principal.username)
        };
        Router::new()
            .route("/protected", get(whoami))
            .layer(middleware::from_fn_with_state(jwt_service, require_bearer_auth))
    }

    async fn send(app: Router, authorization: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder().uri("/protected");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn rejects_requests_without_bearer_token() {
        let response = send(protected_app(jwt()), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_malformed_authorization_schemes() {
        let response = send(protected_app(jwt()), Some("Basic abc123")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn passes_valid_tokens_through_with_the_principal() {
        let jwt_service = jwt();
        let user_id = Uuid::new_v4();
        let token = jwt_service.issue_access_token(user_id, "alice").unwrap();

        let response =
            send(protected_app(jwt_service), Some(&format!("Bearer {token}"))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, format!("{user_id}:alice").as_bytes());
    }

    #[tokio::test]
    async fn bearer_scheme_is_case_insensitive() {
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Bearer  abc "), Some("abc"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Token abc"), None);
    }
}
