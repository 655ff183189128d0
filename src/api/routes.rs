use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::registry::Registry;
use crate::telemetry::Telemetry;

use super::handlers::{create_short_url, health_check, redirect_short_url, short_url_stats, AppState};
use super::middleware::log_request;

pub fn create_router(registry: Arc<Registry>, config: Arc<Config>, telemetry: Telemetry) -> Router {
    let state = Arc::new(AppState {
        registry,
        config,
        telemetry,
    });

    Router::new()
        .route("/health", get(health_check))
        .route("/shorturls", post(create_short_url))
        .route("/shorturls/{code}", get(redirect_short_url))
        .route("/shorturls/{code}/stats", get(short_url_stats))
        .layer(middleware::from_fn(log_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
