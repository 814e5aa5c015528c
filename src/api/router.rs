//! REST API router.
//!
//! Returns a composable `Router` with every resource nested under `/api/`.
//!
//! Layer stack (outermost → innermost):
//! 1. Audit logger → 2. CORS → 3. Auth validator (protected routes only)

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::error::ErrorBody;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected outside the auth layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone());

    let protected = Router::new()
        // Account
        .route(
            "/auth/profile",
            get(endpoints::auth::profile).put(endpoints::auth::update_profile),
        )
        .route("/auth/change-password", put(endpoints::auth::change_password))
        .route("/users", get(endpoints::users::list))
        .route(
            "/users/:id",
            get(endpoints::users::detail).delete(endpoints::users::remove),
        )
        .route("/users/:id/status", put(endpoints::users::set_status))
        // People
        .route(
            "/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route("/patients/stats", get(endpoints::patients::stats))
        .route(
            "/patients/:id",
            get(endpoints::patients::detail)
                .put(endpoints::patients::update)
                .delete(endpoints::patients::remove),
        )
        .route(
            "/doctors",
            get(endpoints::doctors::list).post(endpoints::doctors::create),
        )
        .route("/doctors/available", get(endpoints::doctors::available))
        .route(
            "/doctors/:id",
            get(endpoints::doctors::detail)
                .put(endpoints::doctors::update)
                .delete(endpoints::doctors::remove),
        )
        .route(
            "/doctors/:id/schedule",
            get(endpoints::doctors::schedule).put(endpoints::doctors::update_schedule),
        )
        // Clinical
        .route(
            "/appointments",
            get(endpoints::appointments::list).post(endpoints::appointments::create),
        )
        .route("/appointments/stats", get(endpoints::appointments::stats))
        .route("/appointments/today", get(endpoints::appointments::today_list))
        .route(
            "/appointments/:id",
            get(endpoints::appointments::detail).put(endpoints::appointments::update),
        )
        .route("/appointments/:id/cancel", put(endpoints::appointments::cancel))
        .route(
            "/records",
            get(endpoints::records::list).post(endpoints::records::create),
        )
        .route(
            "/records/patient/:patient_id/history",
            get(endpoints::records::history),
        )
        .route(
            "/records/:id",
            get(endpoints::records::detail)
                .put(endpoints::records::update)
                .delete(endpoints::records::remove),
        )
        // Billing
        .route(
            "/bills",
            get(endpoints::bills::list).post(endpoints::bills::create),
        )
        .route("/bills/stats", get(endpoints::bills::stats))
        .route(
            "/bills/:id",
            get(endpoints::bills::detail)
                .put(endpoints::bills::update)
                .delete(endpoints::bills::remove),
        )
        .route("/bills/:id/payment", post(endpoints::bills::payment))
        // Stock
        .route(
            "/inventory",
            get(endpoints::inventory::list).post(endpoints::inventory::create),
        )
        .route("/inventory/stats", get(endpoints::inventory::stats))
        .route("/inventory/low-stock", get(endpoints::inventory::low_stock))
        .route("/inventory/expired", get(endpoints::inventory::expired))
        .route(
            "/inventory/expiring-soon",
            get(endpoints::inventory::expiring_soon),
        )
        .route(
            "/inventory/:id",
            get(endpoints::inventory::detail)
                .put(endpoints::inventory::update)
                .delete(endpoints::inventory::remove),
        )
        .route("/inventory/:id/stock", put(endpoints::inventory::adjust))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must sit outside auth so the middleware can extract ApiContext
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", public.merge(protected))
        .fallback(route_not_found)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
}

async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            message: "Route not found".into(),
            error: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::api::test_harness::Harness;
    use crate::models::Role;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_enveloped_404() {
        let h = Harness::new();
        let (status, body) = h.get("/api/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Route not found");

        let (status, _) = h.get("/favicon.ico", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = Harness::new();
        let (status, body) = h.get("/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn protected_routes_require_a_valid_token() {
        let h = Harness::new();
        let (status, body) = h.get("/api/patients", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Access token required");

        let (status, body) = h.get("/api/patients", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn role_gates_return_403() {
        let h = Harness::new();
        let (_, patient) = h.patient("Pat");
        for uri in ["/api/users", "/api/patients", "/api/bills/stats", "/api/inventory/stats"] {
            let (status, body) = h.get(uri, Some(&patient)).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(body["success"], false);
        }

        let (_, nurse) = h.staff(Role::Nurse);
        let (status, _) = h.get("/api/patients", Some(&nurse)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_id_is_a_bad_request() {
        let h = Harness::new();
        let admin = h.admin();
        let (status, body) = h.get("/api/bills/not-a-uuid", Some(&admin)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid ID format");
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let h = Harness::new();
        let app = crate::api::router::api_router(h.core.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("Origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let body = body_json(response).await;
        assert_eq!(body["message"], "Hospital Management System API is running");
    }
}
