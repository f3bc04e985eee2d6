//! HTTP routes for the session gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::discovery::KeySourceProbe;
use crate::auth::{
    AccessGuard, ConfigLogOnce, JwksClient, RetryPolicy, TokenVerification, TokenVerifier,
    VerifierSettings,
};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_session, AuthState};
use crate::session::SessionCookieSettings;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use crate::observability::metrics::init_metrics_recorder;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Cached key set of the verifier (used by readiness).
    pub jwks_client: Arc<JwksClient>,

    /// Single-shot verifier used by the session endpoint.
    pub verifier: Arc<dyn TokenVerification>,

    /// Retry-wrapped verification for page-level checks.
    pub guard: AccessGuard,

    /// Key source diagnostics.
    pub probe: Arc<KeySourceProbe>,

    /// Session cookie attributes.
    pub cookie: SessionCookieSettings,
}

impl AppState {
    /// Build the verifier stack once from configuration.
    pub fn from_config(config: Config) -> Self {
        Self::with_config_log(config, Arc::new(ConfigLogOnce::new()))
    }

    /// Same as [`AppState::from_config`] with a caller-owned config log.
    pub fn with_config_log(config: Config, config_log: Arc<ConfigLogOnce>) -> Self {
        let jwks_client = Arc::new(JwksClient::new(
            config.jwks_url(),
            config.jwks_cache_ttl,
            config.http_timeout,
        ));
        let verifier: Arc<dyn TokenVerification> = Arc::new(
            TokenVerifier::new(
                Arc::clone(&jwks_client),
                VerifierSettings::from_config(&config),
            )
            .with_config_log(config_log),
        );
        let guard = AccessGuard::new(Arc::clone(&verifier), RetryPolicy::from_config(&config));
        let probe = Arc::new(KeySourceProbe::from_config(&config));
        let cookie = SessionCookieSettings::from_config(&config);

        Self {
            config,
            jwks_client,
            verifier,
            guard,
            probe,
            cookie,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/ready` - Readiness probe (key set loads)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/session` - Establish (POST), tear down (DELETE) or check (GET) the session
/// - `/api/jwks-test` - Key source diagnostics
/// - `/api/me` - Current user - requires authentication
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        guard: state.guard.clone(),
    });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route(
            "/api/session",
            post(handlers::establish_session)
                .delete(handlers::teardown_session)
                .get(handlers::session_status),
        )
        .route("/api/jwks-test", get(handlers::probe_key_sources))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/api/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(auth_state, require_session))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
