//! HTTP middleware: request-id propagation, request metrics, and explicit
//! admin bearer-token checks.

use crate::error::AppError;
use crate::startup::AppState;
use axum::http::HeaderValue;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use secrecy::ExposeSecret;
use std::time::Instant;
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const ADMIN_USER_HEADER: &str = "x-admin-user";

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    let mut response = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    let labels = [("method", method), ("path", path), ("status", status)];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    response
}

/// Bearer-token check for the admin API.
///
/// With no token configured the check is disabled, mirroring how the other
/// platform services run in local development.
pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.config.admin.api_token.expose_secret();
    if expected.is_empty() {
        return Ok(next.run(req).await);
    }

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            tracing::warn!(path = %req.uri().path(), "Missing admin bearer token");
            AppError::Unauthorized(anyhow::anyhow!("Missing bearer token"))
        })?;

    let matches: bool = expected.as_bytes().len() == provided.as_bytes().len()
        && expected.as_bytes().ct_eq(provided.as_bytes()).into();

    if !matches {
        tracing::warn!(path = %req.uri().path(), "Invalid admin bearer token");
        return Err(AppError::Forbidden(anyhow::anyhow!("Invalid bearer token")));
    }

    Ok(next.run(req).await)
}

/// Reviewer identity from the admin request, defaulting to a shared name.
pub fn admin_user(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(ADMIN_USER_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("admin")
        .to_string()
}
