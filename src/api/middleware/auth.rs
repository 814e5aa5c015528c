//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies the JWT, confirms the
//! account still exists and is active, and injects `AuthUser` into request
//! extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::repository;

/// Require a valid bearer token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

fn bearer_token(req: &Request<axum::body::Body>) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or_else(|| ApiError::Internal {
            context: "Authentication failed".into(),
            detail: "missing API context".into(),
        })?;

    // 1. Extract and verify the token
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    let claims = ctx.core.tokens().verify(token)?;

    // 2. Deleted or deactivated accounts lose access immediately
    let conn = ctx.core.open_db()?;
    let active = repository::get_user(&conn, &claims.id)?.is_some_and(|u| u.is_active());
    drop(conn);
    if !active {
        tracing::warn!(user_id = %claims.id, "Token for missing or inactive account");
        return Err(ApiError::InvalidToken);
    }

    // 3. Inject caller identity for downstream handlers and the audit layer
    let user = AuthUser {
        id: claims.id,
        email: claims.email,
        role: claims.role,
    };
    req.extensions_mut().insert(user.clone());

    let mut response = next.run(req).await;
    response.extensions_mut().insert(user);
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}
