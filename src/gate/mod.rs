#![allow(clippy::needless_for_each)]

use crate::{
    cli::globals::GlobalArgs,
    gate::{
        attempts::{AttemptPolicy, AttemptTracker},
        bootstrap::RetryPolicy,
        handlers::ClientAddressing,
        relay::{RelayNotifier, WebhookRelay, DEFAULT_RELAY_TIMEOUT},
        service::{AdminService, VerificationService},
        store::{PasscodeStore, PgPasscodeStore},
    },
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal, time::Instant};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod attempts;
pub mod bootstrap;
pub mod handlers;
pub mod relay;
pub mod service;
pub mod store;

mod openapi;

pub use openapi::openapi;

/// Tunables for the gateway that are not secrets.
#[derive(Clone, Copy, Debug)]
pub struct GateConfig {
    policy: AttemptPolicy,
    relay_timeout: Duration,
    db_retry: RetryPolicy,
    addressing: ClientAddressing,
}

impl GateConfig {
    /// Default config: default attempt policy, 10s relay timeout,
    /// 10 database connection attempts 5s apart, peer-address client keys.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            policy: AttemptPolicy::new(),
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
            db_retry: RetryPolicy::new(),
            addressing: ClientAddressing::peer(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: AttemptPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_relay_timeout_seconds(mut self, seconds: u64) -> Self {
        self.relay_timeout = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub const fn with_db_retry(mut self, db_retry: RetryPolicy) -> Self {
        self.db_retry = db_retry;
        self
    }

    #[must_use]
    pub const fn with_addressing(mut self, addressing: ClientAddressing) -> Self {
        self.addressing = addressing;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn relay_timeout(&self) -> Duration {
        self.relay_timeout
    }

    #[must_use]
    pub const fn db_retry(&self) -> &RetryPolicy {
        &self.db_retry
    }

    #[must_use]
    pub const fn addressing(&self) -> ClientAddressing {
        self.addressing
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the application router around already-constructed services.
pub fn router(
    verifier: Arc<VerificationService>,
    admin: Arc<AdminService>,
    store: Arc<dyn PasscodeStore>,
    addressing: ClientAddressing,
) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/add_passcode", post(handlers::add_passcode))
        .route("/check_passcode", post(handlers::check_passcode))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
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
                .layer(Extension(verifier))
                .layer(Extension(admin))
                .layer(Extension(addressing)),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(store))
}

/// Start the server
/// # Errors
/// Return error if the database never becomes ready or the listener fails
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs, config: GateConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(Duration::from_secs(5))
        .test_before_acquire(true)
        .connect_lazy(&dsn)
        .context("Invalid database connection string")?;

    let pg_store = PgPasscodeStore::new(pool);
    bootstrap::retry(*config.db_retry(), "database", || pg_store.ensure_schema())
        .await
        .context("Could not initialize the passcodes table")?;
    info!("Database initialized");

    let store: Arc<dyn PasscodeStore> = Arc::new(pg_store);
    let relay: Arc<dyn RelayNotifier> = Arc::new(WebhookRelay::new(
        globals.relay_url.clone(),
        config.relay_timeout(),
    )?);

    let tracker = Arc::new(AttemptTracker::new(*config.policy()));
    spawn_attempt_sweeper(tracker.clone());

    let verifier = Arc::new(VerificationService::new(tracker, store.clone(), relay));
    let admin = Arc::new(AdminService::new(globals.admin_secret.clone(), store.clone()));

    let app = router(verifier, admin, store, config.addressing());

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Periodically drop expired attempt entries so the map cannot grow without bound.
fn spawn_attempt_sweeper(tracker: Arc<AttemptTracker>) {
    let period = tracker.policy().lockout().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let removed = tracker.sweep(Instant::now()).await;
            if removed > 0 {
                debug!("Swept {} expired attempt entries", removed);
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
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
