//! Shared types for the API layer: context, caller identity, extractors
//! and the response envelope.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::authorization::{self, AccessScope};
use crate::core_state::CoreState;
use crate::models::{Pagination, Role};

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Caller identity (injected by auth middleware)
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, taken from a verified JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// 403 unless the caller has one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        authorization::require_role(self.role, roles).map_err(|e| {
            tracing::warn!(user_id = %self.id, role = %self.role, "Role gate denied");
            ApiError::from(e)
        })
    }

    pub fn scope(&self, conn: &Connection) -> Result<AccessScope, ApiError> {
        Ok(authorization::resolve_scope(conn, &self.id, self.role)?)
    }
}

/// Calendar date used for "today" queries and expiry checks.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

// ═══════════════════════════════════════════════════════════
// Extractors with envelope rejections
// ═══════════════════════════════════════════════════════════

/// `Json<T>` whose rejection renders as a 400 envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query<T>` whose rejection renders as a 400 envelope.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Path id extractor: a malformed UUID is a 400.
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|_: PathRejection| ApiError::BadRequest("Invalid ID format".into()))?;
        Ok(Self(value))
    }
}

// ═══════════════════════════════════════════════════════════
// Response envelope
// ═══════════════════════════════════════════════════════════

/// Success body: `{success: true, message?, data?}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: None,
        data: Some(data),
    })
}

pub fn ok_with<T: Serialize>(message: &str, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: Some(message.to_string()),
        data: Some(data),
    })
}

/// Success with a message and no payload.
pub fn done(message: &str) -> Json<Envelope<()>> {
    Json(Envelope {
        success: true,
        message: Some(message.to_string()),
        data: None,
    })
}

pub fn created<T: Serialize>(message: &str, data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok_with(message, data))
}

/// `{<key>: [...], pagination: {...}}` payload of a paginated list.
#[derive(Debug, Serialize)]
pub struct Listing {
    #[serde(flatten)]
    items: serde_json::Map<String, serde_json::Value>,
    pagination: Pagination,
}

pub fn listing<T: Serialize>(
    key: &str,
    items: Vec<T>,
    pagination: Pagination,
) -> Result<Listing, ApiError> {
    let value = serde_json::to_value(items).map_err(|e| ApiError::Internal {
        context: "Failed to encode response".into(),
        detail: e.to_string(),
    })?;
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), value);
    Ok(Listing {
        items: map,
        pagination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;

    #[test]
    fn envelope_omits_absent_fields() {
        let json = serde_json::to_value(done("Deleted").0).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "message": "Deleted"}));

        let json = serde_json::to_value(ok(5).0).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 5}));
    }

    #[test]
    fn listing_nests_items_under_key() {
        let page = Page::new(Some(2), Some(2));
        let listing = listing("patients", vec!["a", "b"], page.pagination(5)).unwrap();
        let json = serde_json::to_value(listing).unwrap();
        assert_eq!(json["patients"], serde_json::json!(["a", "b"]));
        assert_eq!(json["pagination"]["total"], 5);
        assert_eq!(json["pagination"]["page"], 2);
        assert_eq!(json["pagination"]["pages"], 3);
    }

    #[test]
    fn role_gate_on_caller() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "n@h.test".into(),
            role: Role::Nurse,
        };
        assert!(user.require(&[Role::Admin, Role::Nurse]).is_ok());
        assert_eq!(
            user.require(&[Role::Admin]).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
    }
}
