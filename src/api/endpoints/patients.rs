//! Patient endpoints.
//!
//! Staff list and create patients; a patient may read and edit only their
//! own profile.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::accounts::{self, NewAccount};
use crate::api::error::{ApiError, Context};
use crate::api::types::{
    created, done, listing, ok, ok_with, ApiContext, ApiJson, ApiPath, ApiQuery, ApiResult,
    AuthUser, Envelope, Listing,
};
use crate::db::repository;
use crate::models::*;

#[derive(Deserialize)]
pub struct PatientListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

/// `GET /api/patients`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiQuery(q): ApiQuery<PatientListQuery>,
) -> ApiResult<Listing> {
    me.require(&[Role::Admin, Role::Doctor, Role::Nurse])?;
    const FAILED: &str = "Failed to get patients";
    let page = Page::new(q.page, q.limit);
    let conn = ctx.core.open_db().context(FAILED)?;
    let (patients, total) =
        repository::list_patients(&conn, &PatientFilter { search: q.search }, page).context(FAILED)?;
    Ok(ok(listing("patients", patients, page.pagination(total))?))
}

/// `GET /api/patients/stats`
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
) -> ApiResult<PatientStats> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to get patient statistics";
    let conn = ctx.core.open_db().context(FAILED)?;
    Ok(ok(repository::patient_stats(&conn).context(FAILED)?))
}

/// `GET /api/patients/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<PatientView> {
    const FAILED: &str = "Failed to get patient";
    let conn = ctx.core.open_db().context(FAILED)?;
    let patient = repository::get_patient(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Patient"))?;
    if me.role == Role::Patient && patient.patient.user_id != me.id {
        return Err(ApiError::Forbidden("Access denied".into()));
    }
    Ok(ok(patient))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(flatten)]
    pub profile: PatientProfile,
}

/// `POST /api/patients`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Envelope<PatientView>>), ApiError> {
    me.require(&[Role::Admin])?;
    let account = NewAccount {
        name: req.name,
        email: req.email,
        password: req.password,
        phone: req.phone,
    };
    let mut conn = ctx.core.open_db().context("Failed to create patient")?;
    let patient =
        accounts::register_patient(&mut conn, &account, req.date_of_birth, req.gender, req.profile)
            .context("Failed to create patient")?;
    Ok(created("Patient created successfully", patient))
}

#[derive(Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub fields: PatientUpdate,
}

/// `PUT /api/patients/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdatePatientRequest>,
) -> ApiResult<PatientView> {
    const FAILED: &str = "Failed to update patient profile";
    let conn = ctx.core.open_db().context(FAILED)?;
    let existing = repository::get_patient(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Patient"))?;
    if me.role == Role::Patient && existing.patient.user_id != me.id {
        tracing::warn!(user_id = %me.id, patient_id = %id, "Patient edit of foreign profile refused");
        return Err(ApiError::Forbidden(
            "Unauthorized: You can only update your own patient profile.".into(),
        ));
    }

    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if name.is_some() || req.phone.is_some() {
        repository::update_user_contact(&conn, &existing.patient.user_id, name, req.phone.as_deref())
            .context(FAILED)?;
    }
    repository::update_patient(&conn, &id, &req.fields).context(FAILED)?;

    let patient = repository::get_patient(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Patient"))?;
    Ok(ok_with("Patient profile updated successfully", patient))
}

/// `DELETE /api/patients/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to delete patient";
    let conn = ctx.core.open_db().context(FAILED)?;
    if !repository::delete_patient_with_user(&conn, &id).context(FAILED)? {
        return Err(ApiError::not_found("Patient"));
    }
    tracing::info!(patient_id = %id, by = %me.id, "Patient deleted");
    Ok(done("Patient deleted successfully"))
}
