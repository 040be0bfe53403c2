use crate::config::Config;
use crate::sync::LeadSync;
use crate::webhook_handler;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Maximum accepted webhook body.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SmartLead → Twenty sync pipeline.
    pub sync: LeadSync,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Webhook routes, before rate limiting and state are attached.
pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/webhooks/smartlead",
            post(webhook_handler::smartlead_webhook),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// Webhook routes behind the per-IP rate limiter: burst of 20, one slot
/// replenished every 10 seconds.
pub fn rate_limited_webhook_routes() -> anyhow::Result<Router<Arc<AppState>>> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    Ok(webhook_routes().layer(GovernorLayer {
        config: governor_conf,
    }))
}

/// Assembles the application around the given webhook routes.
/// The health check never goes through the webhook middleware.
pub fn app(state: Arc<AppState>, webhook: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(webhook)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Served application, rate limiter included.
pub fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    Ok(app(state, rate_limited_webhook_routes()?))
}
