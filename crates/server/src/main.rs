mod api;
mod auth;
mod broadcast;
mod config;
mod cors;
mod error;
mod identity;
mod presence;
mod reconcile;
mod store;
mod ws;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::jwt::JwtAccessTokenService;
use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::identity::IdentityResolver;
use crate::presence::{kv::PresenceKv, PresenceTracker};
use crate::reconcile::UpdateReconciler;
use crate::store::DocumentStore;
use crate::ws::handler::GatewayState;
use crate::ws::session::SessionRegistry;

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if config.is_dev_jwt_secret() {
        warn!("running with the development JWT secret; set COEDIT_JWT_SECRET in production");
    }

    let jwt_service =
        Arc::new(JwtAccessTokenService::new(&config.jwt_secret).context("invalid JWT secret")?);

    let (docs, identity) = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            info!("using postgres-backed stores");
            (DocumentStore::Postgres(pool.clone()), IdentityResolver::Postgres(pool))
        }
        None => {
            warn!("COEDIT_DATABASE_URL not set; using in-memory stores");
            (DocumentStore::memory(), IdentityResolver::memory())
        }
    };

    let registry = Arc::new(SessionRegistry::default());
    let presence = Arc::new(PresenceTracker::new(PresenceKv::default(), identity));
    let broadcast = Broadcaster::new(Arc::clone(&registry));
    let reconciler =
        Arc::new(UpdateReconciler::new(docs.clone(), Arc::clone(&presence), broadcast.clone()));

    let gateway_state = GatewayState {
        jwt: Arc::clone(&jwt_service),
        registry,
        presence: Arc::clone(&presence),
        reconciler,
        broadcast: broadcast.clone(),
    };
    let documents_state = api::documents::DocumentsApiState { docs, presence, broadcast };

    let app = build_router(gateway_state, api::documents::router(jwt_service, documents_state))
        .layer(cors::cors_layer(config.cors_origins.clone()));

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {listen_addr}"))?;

    info!(%listen_addr, "starting collaboration server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")
}

fn build_router(gateway_state: GatewayState, api_router: Router) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(ws::handler::router(gateway_state))
            .merge(api_router),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    info!("shutdown signal received");
}

// Runs each request on its own task so a handler panic becomes a 500
// instead of tearing down the connection.
async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    let outcome = tokio::spawn(async move { next.run(request).await }).await;
    outcome.unwrap_or_else(|join_error| {
        error!(?join_error, "request handling panicked");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = incoming_request_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        %request_id,
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "http request"
    );

    response
}

fn incoming_request_id(request: &Request<Body>) -> Option<String> {
    let value = request.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?;
    (!value.is_empty()).then(|| value.to_owned())
}
