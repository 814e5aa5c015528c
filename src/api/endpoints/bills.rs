//! Billing endpoints. Patients are limited to their own bills; staff see all.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::{ApiError, Context};
use crate::api::types::{
    created, done, listing, ok, ok_with, today, ApiContext, ApiJson, ApiPath, ApiQuery, ApiResult,
    AuthUser, Envelope, Listing,
};
use crate::authorization::AccessScope;
use crate::billing;
use crate::db::repository;
use crate::models::*;

/// Whether a bill of `patient_id` is visible under `scope`.
fn may_see_bill(me: &AuthUser, scope: AccessScope, patient_id: &Uuid) -> bool {
    match scope {
        AccessScope::Patient(own) => own == *patient_id,
        AccessScope::Nothing => me.role != Role::Patient,
        AccessScope::All | AccessScope::Doctor(_) => true,
    }
}

fn visible_bill(
    conn: &rusqlite::Connection,
    me: &AuthUser,
    id: &Uuid,
    operation: &str,
) -> Result<BillView, ApiError> {
    let scope = me.scope(conn)?;
    let view = repository::get_bill_view(conn, id)
        .context(operation)?
        .ok_or_else(|| ApiError::not_found("Bill"))?;
    if !may_see_bill(me, scope, &view.bill.patient_id) {
        tracing::warn!(user_id = %me.id, bill_id = %id, "Foreign bill access refused");
        return Err(ApiError::Forbidden("Access denied".into()));
    }
    Ok(view)
}

fn reload(conn: &rusqlite::Connection, id: &Uuid, operation: &str) -> Result<BillView, ApiError> {
    repository::get_bill_view(conn, id)
        .context(operation)?
        .ok_or_else(|| ApiError::not_found("Bill"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<BillStatus>,
    pub patient_id: Option<Uuid>,
}

/// `GET /api/bills`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiQuery(q): ApiQuery<BillListQuery>,
) -> ApiResult<Listing> {
    const FAILED: &str = "Failed to get bills";
    let page = Page::new(q.page, q.limit);
    let conn = ctx.core.open_db().context(FAILED)?;
    let patient_id = match me.scope(&conn)? {
        AccessScope::Patient(own) => Some(own),
        AccessScope::Nothing if me.role == Role::Patient => {
            return Ok(ok(listing("bills", Vec::<BillView>::new(), page.pagination(0))?));
        }
        _ => q.patient_id,
    };

    let filter = BillFilter {
        status: q.status,
        scope: Scope {
            patient_id,
            doctor_id: None,
        },
    };
    let (rows, total) = repository::list_bills(&conn, &filter, page).context(FAILED)?;
    Ok(ok(listing("bills", rows, page.pagination(total))?))
}

/// `GET /api/bills/stats`
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
) -> ApiResult<BillStats> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to get billing statistics";
    let conn = ctx.core.open_db().context(FAILED)?;
    Ok(ok(repository::bill_stats(&conn).context(FAILED)?))
}

/// `GET /api/bills/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BillView> {
    const FAILED: &str = "Failed to get bill";
    let conn = ctx.core.open_db().context(FAILED)?;
    Ok(ok(visible_bill(&conn, &me, &id, FAILED)?))
}

/// `POST /api/bills`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<NewBill>,
) -> Result<(StatusCode, Json<Envelope<BillView>>), ApiError> {
    me.require(&[Role::Admin, Role::Doctor])?;
    const FAILED: &str = "Failed to create bill";
    let mut conn = ctx.core.open_db().context(FAILED)?;
    let bill = billing::create_bill(&mut conn, req, today()).context(FAILED)?;
    Ok(created("Bill created successfully", reload(&conn, &bill.id, FAILED)?))
}

/// `PUT /api/bills/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<BillUpdate>,
) -> ApiResult<BillView> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to update bill";
    let mut conn = ctx.core.open_db().context(FAILED)?;
    billing::update_bill(&mut conn, &id, req).context(FAILED)?;
    Ok(ok_with("Bill updated successfully", reload(&conn, &id, FAILED)?))
}

/// `POST /api/bills/:id/payment`
pub async fn payment(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<Payment>,
) -> ApiResult<BillView> {
    const FAILED: &str = "Failed to process payment";
    let mut conn = ctx.core.open_db().context(FAILED)?;
    visible_bill(&conn, &me, &id, FAILED)?;
    billing::record_payment(&mut conn, &id, req).context(FAILED)?;
    Ok(ok_with("Payment processed successfully", reload(&conn, &id, FAILED)?))
}

/// `DELETE /api/bills/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to delete bill";
    let conn = ctx.core.open_db().context(FAILED)?;
    billing::delete_bill(&conn, &id).context(FAILED)?;
    tracing::info!(bill_id = %id, by = %me.id, "Bill deleted");
    Ok(done("Bill deleted successfully"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::test_harness::Harness;
    use crate::models::Patient;

    fn new_bill(patient: &Patient) -> serde_json::Value {
        json!({
            "patientId": patient.id,
            "services": [
                {"name": "Consultation", "quantity": 1, "price": 150},
                {"name": "Blood test", "quantity": 2, "price": 25.5}
            ],
            "dueDate": "2026-12-31"
        })
    }

    async fn create(h: &Harness, token: &str, patient: &Patient) -> String {
        let (status, body) = h.post("/api/bills", Some(token), new_bill(patient)).await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_totals_services_and_numbers_invoice() {
        let h = Harness::new();
        let admin = h.admin();
        let (patient, _) = h.patient("Pat");

        let (status, body) = h.post("/api/bills", Some(&admin), new_bill(&patient)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Bill created successfully");
        assert_eq!(body["data"]["totalAmount"], 201.0);
        assert_eq!(body["data"]["balanceAmount"], 201.0);
        assert_eq!(body["data"]["status"], "pending");
        assert!(body["data"]["invoiceNumber"].as_str().unwrap().starts_with("INV-"));
        assert_eq!(body["data"]["patient"]["name"], "Pat");
    }

    #[tokio::test]
    async fn payments_move_status_and_reject_overpayment() {
        let h = Harness::new();
        let admin = h.admin();
        let (patient, patient_token) = h.patient("Pat");
        let id = create(&h, &admin, &patient).await;
        let uri = format!("/api/bills/{id}/payment");

        let (status, body) = h
            .post(&uri, Some(&patient_token), json!({"amount": 101, "paymentMethod": "card"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Payment processed successfully");
        assert_eq!(body["data"]["status"], "partially_paid");
        assert_eq!(body["data"]["balanceAmount"], 100.0);

        let (status, body) = h.post(&uri, Some(&patient_token), json!({"amount": 100.01})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid payment amount");

        let (status, _) = h.post(&uri, Some(&patient_token), json!({"amount": 0})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = h.post(&uri, Some(&admin), json!({"amount": 100})).await;
        assert_eq!(body["data"]["status"], "paid");
        assert_eq!(body["data"]["balanceAmount"], 0.0);

        let (status, body) = h.delete(&format!("/api/bills/{id}"), Some(&admin)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Cannot delete a bill that has been paid");
    }

    #[tokio::test]
    async fn patients_see_and_pay_only_their_bills() {
        let h = Harness::new();
        let (_, doctor) = h.doctor("Dr. Bill");
        let (alice, alice_token) = h.patient("Alice");
        let (bob, _) = h.patient("Bob");
        create(&h, &doctor, &alice).await;
        let bobs = create(&h, &doctor, &bob).await;

        let (_, body) = h.get("/api/bills", Some(&alice_token)).await;
        assert_eq!(body["data"]["pagination"]["total"], 1);
        assert_eq!(body["data"]["bills"][0]["patient"]["name"], "Alice");

        let (_, body) = h.get("/api/bills", Some(&doctor)).await;
        assert_eq!(body["data"]["pagination"]["total"], 2);

        let (status, _) = h.get(&format!("/api/bills/{bobs}"), Some(&alice_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = h
            .post(&format!("/api/bills/{bobs}/payment"), Some(&alice_token), json!({"amount": 1}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = h.post("/api/bills", Some(&alice_token), new_bill(&alice)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_rebalances_and_stats_aggregate() {
        let h = Harness::new();
        let admin = h.admin();
        let (patient, _) = h.patient("Pat");
        let id = create(&h, &admin, &patient).await;
        h.post(&format!("/api/bills/{id}/payment"), Some(&admin), json!({"amount": 50})).await;

        let (status, body) = h
            .put(
                &format!("/api/bills/{id}"),
                Some(&admin),
                json!({"services": [{"name": "Consultation", "price": 80}], "notes": "discount"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalAmount"], 80.0);
        assert_eq!(body["data"]["balanceAmount"], 30.0);
        assert_eq!(body["data"]["notes"], "discount");

        let (status, _) = h
            .put(
                &format!("/api/bills/{id}"),
                Some(&admin),
                json!({"services": [{"name": "Consultation", "price": 10}]}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = h.get("/api/bills/stats", Some(&admin)).await;
        assert_eq!(body["data"]["totalRevenue"], 50.0);
        assert_eq!(body["data"]["pendingAmount"], 30.0);
        assert_eq!(body["data"]["totalBills"], 1);
    }

    #[tokio::test]
    async fn unpaid_bill_can_be_deleted() {
        let h = Harness::new();
        let admin = h.admin();
        let (patient, _) = h.patient("Pat");
        let id = create(&h, &admin, &patient).await;

        let (status, body) = h.delete(&format!("/api/bills/{id}"), Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Bill deleted successfully");
        let (status, body) = h.get(&format!("/api/bills/{id}"), Some(&admin)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Bill not found");
    }
}
