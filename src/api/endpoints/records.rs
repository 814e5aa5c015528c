//! Medical record endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::{ApiError, Context};
use crate::api::types::{
    created, done, listing, ok, ok_with, today, ApiContext, ApiJson, ApiPath, ApiQuery, ApiResult,
    AuthUser, Envelope, Listing,
};
use crate::authorization::AccessScope;
use crate::db::repository;
use crate::models::*;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

/// `GET /api/records`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiQuery(q): ApiQuery<RecordListQuery>,
) -> ApiResult<Listing> {
    const FAILED: &str = "Failed to get medical records";
    let page = Page::new(q.page, q.limit);
    let conn = ctx.core.open_db().context(FAILED)?;
    let requested = Scope {
        doctor_id: q.doctor_id,
        patient_id: q.patient_id,
    };
    let Some(scope) = me.scope(&conn)?.restrict(requested) else {
        return Ok(ok(listing("records", Vec::<MedicalRecordView>::new(), page.pagination(0))?));
    };
    let (rows, total) =
        repository::list_medical_records(&conn, &MedicalRecordFilter { scope }, page)
            .context(FAILED)?;
    Ok(ok(listing("records", rows, page.pagination(total))?))
}

/// `GET /api/records/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<MedicalRecordView> {
    const FAILED: &str = "Failed to get medical record";
    let conn = ctx.core.open_db().context(FAILED)?;
    let scope = me.scope(&conn)?;
    let view = repository::get_medical_record(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Medical record"))?;
    if !scope.permits(&view.record.patient_id, Some(&view.record.doctor_id)) {
        return Err(ApiError::Forbidden("Access denied".into()));
    }
    Ok(ok(view))
}

/// `GET /api/records/patient/:patientId/history`
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> ApiResult<Vec<MedicalRecordView>> {
    const FAILED: &str = "Failed to get patient history";
    let conn = ctx.core.open_db().context(FAILED)?;
    if !me.scope(&conn)?.permits_patient(&patient_id) {
        tracing::warn!(user_id = %me.id, patient_id = %patient_id, "Foreign history refused");
        return Err(ApiError::Forbidden("Access denied".into()));
    }
    let rows = repository::patient_history(&conn, &patient_id).context(FAILED)?;
    Ok(ok(rows))
}

/// `POST /api/records`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<NewMedicalRecord>,
) -> Result<(StatusCode, Json<Envelope<MedicalRecordView>>), ApiError> {
    me.require(&[Role::Admin, Role::Doctor])?;
    const FAILED: &str = "Failed to create medical record";
    let diagnosis = req.diagnosis.trim();
    if diagnosis.is_empty() {
        return Err(ApiError::BadRequest("Diagnosis is required".into()));
    }

    let conn = ctx.core.open_db().context(FAILED)?;
    let doctor_id = match (req.doctor_id, me.scope(&conn)?) {
        (Some(id), _) => id,
        (None, AccessScope::Doctor(own)) => own,
        (None, _) => return Err(ApiError::BadRequest("Doctor ID is required".into())),
    };
    if !repository::patient_exists(&conn, &req.patient_id).context(FAILED)? {
        return Err(ApiError::not_found("Patient"));
    }
    if repository::get_doctor(&conn, &doctor_id).context(FAILED)?.is_none() {
        return Err(ApiError::not_found("Doctor"));
    }

    let now = Utc::now();
    let record = MedicalRecord {
        id: Uuid::new_v4(),
        patient_id: req.patient_id,
        doctor_id,
        visit_date: req.visit_date.unwrap_or_else(today),
        diagnosis: diagnosis.to_string(),
        symptoms: req.symptoms,
        prescription: req.prescription,
        lab_tests: req.lab_tests,
        treatment_notes: req.treatment_notes,
        follow_up_date: req.follow_up_date,
        created_at: now,
        updated_at: now,
    };
    repository::insert_medical_record(&conn, &record).context(FAILED)?;
    tracing::info!(record_id = %record.id, patient_id = %record.patient_id, "Medical record created");

    let view = repository::get_medical_record(&conn, &record.id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Medical record"))?;
    Ok(created("Medical record created successfully", view))
}

/// `PUT /api/records/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<MedicalRecordUpdate>,
) -> ApiResult<MedicalRecordView> {
    me.require(&[Role::Admin, Role::Doctor])?;
    const FAILED: &str = "Failed to update medical record";
    let conn = ctx.core.open_db().context(FAILED)?;
    let existing = repository::get_medical_record(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Medical record"))?;
    if me.role == Role::Doctor
        && me.scope(&conn)?.doctor_id() != Some(existing.record.doctor_id)
    {
        return Err(ApiError::Forbidden("You can only update your own records".into()));
    }
    if req.diagnosis.as_deref().is_some_and(|d| d.trim().is_empty()) {
        return Err(ApiError::BadRequest("Diagnosis is required".into()));
    }

    repository::update_medical_record(&conn, &id, &req).context(FAILED)?;
    let view = repository::get_medical_record(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Medical record"))?;
    Ok(ok_with("Medical record updated successfully", view))
}

/// `DELETE /api/records/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to delete medical record";
    let conn = ctx.core.open_db().context(FAILED)?;
    if !repository::delete_medical_record(&conn, &id).context(FAILED)? {
        return Err(ApiError::not_found("Medical record"));
    }
    tracing::info!(record_id = %id, by = %me.id, "Medical record deleted");
    Ok(done("Medical record deleted successfully"))
}
