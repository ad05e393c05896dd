use crate::{
    api::handlers::auth,
    directory::{MemoryUserDirectory, PgUserDirectory, UserDirectory},
    guard::{
        AlertDispatcher, AuditRecorder, FailedAttemptTracker, LogAuditRecorder, MemoryAttemptStore,
        PgAuditRecorder, TrackerConfig,
    },
    token::{
        Argon2Hasher, MemoryTokenStore, PgTokenStore, Sha256Hasher, SweeperConfig, TokenService,
        TokenStore, spawn_sweeper,
    },
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::options,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Assemble the full application: documented routes, Swagger UI, the auth
/// activity layer, and request tracing.
#[must_use]
pub fn app(
    auth_state: Arc<auth::AuthState>,
    monitor: Arc<auth::ActivityMonitor>,
    pool: Option<PgPool>,
) -> Router {
    // Build the router from OpenAPI-wired routes, then extend it with non-doc
    // routes like preflight-only `OPTIONS /health`.
    let (router, api) = router().split_for_parts();
    router
        .merge(SwaggerUi::new("/swagger-ui").url("/v1/openapi.json", api))
        .route("/health", options(handlers::health::health))
        // The activity layer sits inside tracing so its work is part of the
        // request span, and outside the handlers so it sees every response.
        .layer(middleware::from_fn_with_state(
            monitor,
            auth::activity::track,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth_state)),
        )
        .layer(Extension(pool))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: Option<String>,
    auth_config: auth::AuthConfig,
    tracker_config: TrackerConfig,
    sweeper_config: SweeperConfig,
    alerts: Arc<dyn AlertDispatcher>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    spawn_shutdown_listener(tx);

    let pool = match dsn {
        Some(dsn) => Some(
            PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(&dsn)
                .await
                .context("Failed to connect to database")?,
        ),
        None => None,
    };

    // Token secrets are high-entropy random values and get a plain digest;
    // user-chosen passwords get Argon2id.
    let token_hasher = Arc::new(Sha256Hasher);
    let password_hasher = Arc::new(Argon2Hasher::default());

    let (store, directory, recorder): (
        Arc<dyn TokenStore>,
        Arc<dyn UserDirectory>,
        Arc<dyn AuditRecorder>,
    ) = match pool.clone() {
        Some(pool) => (
            Arc::new(PgTokenStore::new(pool.clone())),
            Arc::new(PgUserDirectory::new(pool.clone(), password_hasher)),
            Arc::new(PgAuditRecorder::new(pool)),
        ),
        None => {
            info!("No database configured, using in-memory storage");
            (
                Arc::new(MemoryTokenStore::new()),
                Arc::new(MemoryUserDirectory::new(password_hasher)),
                Arc::new(LogAuditRecorder),
            )
        }
    };

    let tokens = TokenService::new(store, token_hasher, alerts.clone());

    // Background sweeper deletes records past expiry so the store only ever
    // holds live or recently retired tokens.
    spawn_sweeper(tokens.clone(), sweeper_config);

    let tracker = FailedAttemptTracker::new(
        Arc::new(MemoryAttemptStore::new(tracker_config.window_seconds())),
        alerts,
        tracker_config,
    );
    let monitor = Arc::new(auth::ActivityMonitor::new(recorder, tracker));
    let auth_state = Arc::new(auth::AuthState::new(auth_config, tokens, directory));

    let app = app(auth_state, monitor, pool);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            rx.recv().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn spawn_shutdown_listener(tx: mpsc::UnboundedSender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {err}");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => error!("Failed to listen for SIGTERM: {err}"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        let _ = tx.send(());
    });
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
