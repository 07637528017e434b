//! # RBAC HTTP Server
//!
//! Exposes the access-control core over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /v1/check` - Check the caller's access to a resource/action
//! - `GET /v1/permissions` - Permissions embedded in the caller's credential
//! - `POST /v1/cache/invalidate` - Drop cached permission sets (admin only)
//! - `GET /metrics` - Prometheus metrics
//! - `GET /health` - Health check
//!
//! ## Configuration
//!
//! See [`RbacConfig::from_env`]. `RUST_LOG` sets the log level (default: info).

use anyhow::Context;
use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    serve, Router,
};
use clinic_rbac::{
    types::roles, AccessDecision, AccessEngine, Action, AuthContext, InMemoryPermissionStore,
    PermissionCache, PermissionMap, PermissionResolver, PermissionStore, RbacConfig, RbacState,
    Rejection,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared application state
#[derive(Clone)]
struct AppState {
    rbac: RbacState,
    start_time: std::time::Instant,
}

impl FromRef<AppState> for RbacState {
    fn from_ref(state: &AppState) -> Self {
        state.rbac.clone()
    }
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Rejected(Rejection),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => {
                let body = Json(ErrorResponse {
                    error: "bad_request".to_string(),
                    message,
                });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::Rejected(rejection) => rejection.into_response(),
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        AppError::Rejected(rejection)
    }
}

/// Access check request
#[derive(Debug, Deserialize)]
struct CheckRequest {
    resource: String,
    action: String,
}

/// Caller's embedded permissions
#[derive(Debug, Serialize)]
struct PermissionsResponse {
    id: i64,
    role: String,
    permissions: Option<PermissionMap>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

/// POST /v1/check - Check the caller's access
async fn check_access(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CheckRequest>,
) -> Result<Json<AccessDecision>, AppError> {
    let action: Action = req
        .action
        .parse()
        .map_err(|e: clinic_rbac::RbacError| AppError::BadRequest(e.to_string()))?;

    info!(
        "Access check: subject={}, role={}, resource={}, action={}",
        auth.claims.id, auth.claims.role, req.resource, action
    );

    let decision = state
        .rbac
        .engine
        .authorize(&auth.claims, &req.resource, action)
        .await
        .map_err(|e| {
            error!("Access check failed: {}", e);
            AppError::Rejected(AccessEngine::rejection(e))
        })?;

    info!(
        "Access decision: {} via {:?}",
        if decision.allowed { "ALLOW" } else { "DENY" },
        decision.path
    );

    Ok(Json(decision))
}

/// GET /v1/permissions - Decoded credential permissions
async fn caller_permissions(auth: AuthContext) -> Json<PermissionsResponse> {
    let permissions = auth.permissions();
    Json(PermissionsResponse {
        id: auth.claims.id,
        role: auth.claims.role,
        permissions,
    })
}

/// POST /v1/cache/invalidate - Drop all cached permission sets
async fn invalidate_cache(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<StatusCode, AppError> {
    state
        .rbac
        .engine
        .enforce_roles(&auth.claims, &[roles::ADMIN])
        .await?;

    state.rbac.engine.invalidate_cache();
    info!("Permission cache invalidated by subject {}", auth.claims.id);

    Ok(StatusCode::NO_CONTENT)
}

/// GET /metrics - Prometheus metrics endpoint
async fn metrics(State(state): State<AppState>) -> Response {
    let text = state.rbac.engine.metrics().to_prometheus();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        text,
    )
        .into_response()
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: clinic_rbac::VERSION.to_string(),
    })
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/check", post(check_access))
        .route("/v1/permissions", get(caller_permissions))
        .route("/v1/cache/invalidate", post(invalidate_cache))
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

async fn open_store(config: &RbacConfig) -> anyhow::Result<Arc<dyn PermissionStore>> {
    match &config.database_url {
        #[cfg(feature = "mysql")]
        Some(url) if url.starts_with("mysql://") => {
            info!("Using MySQL permission store");
            let store = clinic_rbac::store::MySqlPermissionStore::new(url)
                .await
                .context("failed to open MySQL permission store")?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        Some(url) => {
            info!("Using PostgreSQL permission store");
            let store = clinic_rbac::store::PostgresPermissionStore::new(url)
                .await
                .context("failed to open PostgreSQL permission store")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            warn!("DATABASE_URL is set but no matching store feature is enabled; using in-memory store");
            Ok(Arc::new(InMemoryPermissionStore::clinic_defaults().await?))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store with clinic defaults");
            Ok(Arc::new(InMemoryPermissionStore::clinic_defaults().await?))
        }
    }
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

/// Main server entrypoint
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Clinic RBAC Server v{}", clinic_rbac::VERSION);

    let config = RbacConfig::from_env().context("invalid configuration")?;

    info!("Configuration:");
    info!("  Port: {}", config.port);
    info!("  Cache TTL: {:?}", config.cache_ttl);
    info!("  Store timeout: {:?}", config.store_timeout);

    let store = open_store(&config).await?;
    let cache = Arc::new(PermissionCache::new(config.cache_ttl));
    let resolver = PermissionResolver::new(store, cache).with_store_timeout(config.store_timeout);

    let state = AppState {
        rbac: RbacState::new(
            config.token_verifier(),
            AccessEngine::new(resolver),
        ),
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shut down gracefully");
    Ok(())
}
