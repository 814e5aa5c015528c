//! Access logging middleware.
//!
//! Logs every API request with method, path, response status, latency and,
//! when the auth layer accepted the caller, the user id.

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthUser;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;
    match response.extensions().get::<AuthUser>() {
        Some(user) => tracing::info!(
            %method, %path, status, latency_ms, user_id = %user.id, role = %user.role,
            "API access"
        ),
        None => tracing::info!(%method, %path, status, latency_ms, "API access"),
    }

    response
}
