use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use url::Url;

use super::client_ip::extract_client_ip;
use crate::config::{Config, TrustedProxyMode};
use crate::models::{CreateLinkRequest, CreateLinkResponse, LinkStatsResponse, Visit};
use crate::registry::{Registry, RegistryError};
use crate::telemetry::Telemetry;

const CATEGORY: &str = "handler";

pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
    pub telemetry: Telemetry,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// One status and message per registry failure kind.
fn registry_error(state: &AppState, err: RegistryError) -> ApiError {
    match err {
        RegistryError::InvalidUrl(_) => error(StatusCode::BAD_REQUEST, "Invalid or missing URL"),
        RegistryError::InvalidCode(_) => error(StatusCode::BAD_REQUEST, "Invalid shortcode"),
        RegistryError::CodeConflict(_) => error(StatusCode::CONFLICT, "Shortcode already in use"),
        RegistryError::NotFound(_) => error(StatusCode::NOT_FOUND, "Shortcode not found"),
        RegistryError::Expired(_) => error(StatusCode::GONE, "Shortlink expired"),
        RegistryError::Internal(detail) => internal_error(state, &detail),
    }
}

fn internal_error(state: &AppState, detail: &str) -> ApiError {
    tracing::error!(error = %detail, "Unexpected error");
    state
        .telemetry
        .error(CATEGORY, format!("unexpected error: {detail}"));
    error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// `{scheme}://{host}` the client used to reach us.
fn public_base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(base) = &config.public_base_url {
        return base.clone();
    }

    let scheme = match config.client_ip.trusted_proxy_mode {
        TrustedProxyMode::None => "http",
        _ => headers
            .get("x-forwarded-proto")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| v.eq_ignore_ascii_case("https"))
            .map(|_| "https")
            .unwrap_or("http"),
    };

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    format!("{scheme}://{host}")
}

/// Create a new short URL
pub async fn create_short_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<Json<CreateLinkResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        state.telemetry.warn(
            CATEGORY,
            format!("rejected create request body: {}", rejection.body_text()),
        );
        error(StatusCode::BAD_REQUEST, "Invalid request body")
    })?;

    let created = state
        .registry
        .create(payload.into_new_link())
        .map_err(|e| registry_error(&state, e))?;

    let base = public_base_url(&state.config, &headers);
    Ok(Json(CreateLinkResponse {
        short_link: format!("{base}/shorturls/{}", created.code),
        expiry: created.expires_at,
    }))
}

/// Redirect to the original URL and record the click
pub async fn redirect_short_url(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let referrer = headers
        .get(header::REFERER)
        .and_then(|h| h.to_str().ok())
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    let client_ip = extract_client_ip(&headers, addr.ip(), &state.config.client_ip);

    let visit = Visit {
        referrer,
        source_address: client_ip.to_string(),
    };

    let target = match state.registry.resolve(&code, visit) {
        Ok(target) => target,
        Err(e) => return registry_error(&state, e).into_response(),
    };

    // Stored URLs passed validation; re-serializing yields an ASCII-only form.
    let location = Url::parse(&target)
        .map_err(|e| e.to_string())
        .and_then(|url| HeaderValue::from_str(url.as_str()).map_err(|e| e.to_string()));

    match location {
        Ok(location) => (
            state.config.redirect_status.status_code(),
            [(header::LOCATION, location)],
        )
            .into_response(),
        Err(e) => internal_error(
            &state,
            &format!("stored url for '{code}' is not a valid Location: {e}"),
        )
        .into_response(),
    }
}

/// Click statistics for a short URL, available after expiry
pub async fn short_url_stats(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<LinkStatsResponse>, ApiError> {
    state
        .registry
        .stats(&code)
        .map(|stats| Json(stats.into()))
        .map_err(|e| registry_error(&state, e))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_base_url_from_host_header() {
        let config = Config::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("sho.rt:8080"));

        assert_eq!(public_base_url(&config, &headers), "http://sho.rt:8080");
    }

    #[test]
    fn test_public_base_url_fallbacks() {
        let mut config = Config::default();
        assert_eq!(public_base_url(&config, &HeaderMap::new()), "http://127.0.0.1:3000");

        config.public_base_url = Some("https://links.example".to_string());
        assert_eq!(public_base_url(&config, &HeaderMap::new()), "https://links.example");
    }

    #[test]
    fn test_forwarded_proto_only_behind_trusted_proxy() {
        let mut config = Config::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("sho.rt"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));

        assert_eq!(public_base_url(&config, &headers), "http://sho.rt");

        config.client_ip.trusted_proxy_mode = TrustedProxyMode::Standard;
        assert_eq!(public_base_url(&config, &headers), "https://sho.rt");
    }
}
