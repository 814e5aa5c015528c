//! API error type and its JSON envelope.
//!
//! Every failure renders as `{success: false, message, error?}`. 500s carry
//! the operation that failed in `message` and the underlying cause in
//! `error`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::accounts::AccountError;
use crate::authorization::AuthorizationError;
use crate::billing::BillingError;
use crate::booking::BookingError;
use crate::core_state::CoreError;
use crate::crypto::CryptoError;
use crate::db::DatabaseError;
use crate::inventory::InventoryError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Access token required")]
    Unauthorized,
    #[error("Invalid or expired token")]
    InvalidToken,
    /// Credential check failed (login, password change).
    #[error("{0}")]
    AuthFailed(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{context}: {detail}")]
    Internal { context: String, detail: String },
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    fn internal(detail: impl ToString) -> Self {
        Self::Internal {
            context: "Internal server error".into(),
            detail: detail.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidToken | Self::AuthFailed(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Internal { context, detail } => {
                tracing::error!(context = %context, detail = %detail, "API internal error");
                ErrorBody {
                    success: false,
                    message: context,
                    error: Some(detail),
                }
            }
            other => ErrorBody {
                success: false,
                message: other.to_string(),
                error: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Attach the failed operation to internal errors, e.g.
/// `.context("Failed to create bill")?`. Client errors pass through.
pub trait Context<T> {
    fn context(self, operation: &str) -> Result<T, ApiError>;
}

impl<T, E: Into<ApiError>> Context<T> for Result<T, E> {
    fn context(self, operation: &str) -> Result<T, ApiError> {
        self.map_err(|e| match e.into() {
            ApiError::Internal { detail, .. } => ApiError::Internal {
                context: operation.to_string(),
                detail,
            },
            other => other,
        })
    }
}

// ─── Conversions ──────────────────────────────────────────────────────────────

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => e.into(),
            CoreError::Account(e) => e.into(),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::internal(err)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => ApiError::not_found(&entity_type),
            other => ApiError::internal(other),
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidToken => ApiError::InvalidToken,
            CryptoError::PasswordTooShort { .. } => ApiError::BadRequest(err.to_string()),
            CryptoError::MalformedHash | CryptoError::Signing(_) => ApiError::internal(err),
        }
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::Database(e) => e.into(),
            denied => ApiError::Forbidden(denied.to_string()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Database(e) => e.into(),
            AccountError::Password(e) => e.into(),
            client => ApiError::BadRequest(client.to_string()),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Database(e) => e.into(),
            BookingError::PatientNotFound
            | BookingError::DoctorNotFound
            | BookingError::AppointmentNotFound => ApiError::NotFound(err.to_string()),
            BookingError::DoctorUnavailable | BookingError::SlotTaken => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Database(e) => e.into(),
            BillingError::PatientNotFound | BillingError::BillNotFound => {
                ApiError::NotFound(err.to_string())
            }
            client => ApiError::BadRequest(client.to_string()),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Database(e) => e.into(),
            InventoryError::NotFound => ApiError::NotFound(err.to_string()),
            client => ApiError::BadRequest(client.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401_envelope() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Access token required");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn internal_carries_context_and_detail() {
        let err: Result<(), _> = Err(rusqlite::Error::InvalidQuery);
        let response = err.context("Failed to create bill").unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Failed to create bill");
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_leaves_client_errors_alone() {
        let err: Result<(), _> = Err(BookingError::SlotTaken);
        let api = err.context("Failed to create appointment").unwrap_err();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        let json = body_json(api.into_response()).await;
        assert_eq!(json["message"], "This time slot is already booked");
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (BookingError::DoctorNotFound.into(), StatusCode::NOT_FOUND),
            (BookingError::DoctorUnavailable.into(), StatusCode::BAD_REQUEST),
            (BillingError::InvalidPayment.into(), StatusCode::BAD_REQUEST),
            (BillingError::BillNotFound.into(), StatusCode::NOT_FOUND),
            (InventoryError::InsufficientStock.into(), StatusCode::BAD_REQUEST),
            (InventoryError::NotFound.into(), StatusCode::NOT_FOUND),
            (AccountError::EmailTaken.into(), StatusCode::BAD_REQUEST),
            (CryptoError::InvalidToken.into(), StatusCode::UNAUTHORIZED),
            (AuthorizationError::RowDenied.into(), StatusCode::FORBIDDEN),
            (
                DatabaseError::not_found("Patient", "x").into(),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }
}
