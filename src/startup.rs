//! Application startup and lifecycle management.

use crate::config::ReconConfig;
use crate::error::AppError;
use crate::handlers;
use crate::middleware::{admin_auth, metrics_middleware, request_id_middleware};
use crate::services::matching::MatchingEngine;
use crate::services::notify::Dispatcher;
use crate::services::providers::{PlaidWebhook, StripeWebhook};
use crate::services::{get_metrics, init_metrics, Database};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get,
    routing::post, Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state, constructed once at startup and handed to the
/// router by reference.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ReconConfig>,
    pub db: Arc<Database>,
    pub stripe: StripeWebhook,
    pub plaid: PlaidWebhook,
    pub engine: Arc<MatchingEngine>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "payment-recon",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "payment-recon",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReconConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the harness.
    pub async fn build_without_migrations(config: ReconConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: ReconConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);

        let stripe = StripeWebhook::new(&config.webhooks);
        let plaid = PlaidWebhook::new(&config.webhooks);

        let dispatcher = Arc::new(Dispatcher::from_config(
            db.clone(),
            &config.notify,
            &config.match_policy,
        ));
        let engine = Arc::new(MatchingEngine::new(
            db.clone(),
            config.match_policy.clone(),
            dispatcher,
        ));

        let state = AppState {
            config: Arc::new(config),
            db,
            stripe,
            plaid,
            engine,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Reconciliation listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let admin_routes = Router::new()
            .route("/payment-events", post(handlers::payments::create_payment_event))
            .route("/payment-events/:event_id", get(handlers::payments::get_payment_event))
            .route(
                "/payment-events/:event_id/review",
                post(handlers::matches::review_match),
            )
            .route("/review-queue", get(handlers::matches::review_queue))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                admin_auth,
            ));

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route("/webhooks/stripe/webhook", post(handlers::stripe::webhook))
            .route("/webhooks/plaid/webhook", post(handlers::plaid::webhook))
            .nest("/api", admin_routes)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        tracing::info!(
            service = "payment-recon",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
