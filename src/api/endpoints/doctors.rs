//! Doctor endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
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
pub struct DoctorListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub specialization: Option<String>,
}

/// `GET /api/doctors`
pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(q): ApiQuery<DoctorListQuery>,
) -> ApiResult<Listing> {
    const FAILED: &str = "Failed to get doctors";
    let page = Page::new(q.page, q.limit);
    let filter = DoctorFilter {
        search: q.search,
        specialization: q.specialization,
    };
    let conn = ctx.core.open_db().context(FAILED)?;
    let (doctors, total) = repository::list_doctors(&conn, &filter, page).context(FAILED)?;
    Ok(ok(listing("doctors", doctors, page.pagination(total))?))
}

#[derive(Deserialize)]
pub struct AvailableQuery {
    pub specialization: Option<String>,
}

/// `GET /api/doctors/available`
pub async fn available(
    State(ctx): State<ApiContext>,
    ApiQuery(q): ApiQuery<AvailableQuery>,
) -> ApiResult<Vec<DoctorView>> {
    const FAILED: &str = "Failed to get available doctors";
    let conn = ctx.core.open_db().context(FAILED)?;
    let doctors =
        repository::list_available_doctors(&conn, q.specialization.as_deref()).context(FAILED)?;
    Ok(ok(doctors))
}

/// `GET /api/doctors/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<DoctorView> {
    const FAILED: &str = "Failed to get doctor";
    let conn = ctx.core.open_db().context(FAILED)?;
    let doctor = repository::get_doctor(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Doctor"))?;
    Ok(ok(doctor))
}

/// `GET /api/doctors/:id/schedule`
pub async fn schedule(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<DoctorSchedule> {
    const FAILED: &str = "Failed to get schedule";
    let conn = ctx.core.open_db().context(FAILED)?;
    let view = repository::get_doctor(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Doctor"))?;
    Ok(ok(DoctorSchedule {
        id: view.doctor.id,
        name: view.user.name,
        schedule: view.doctor.schedule,
        availability: view.doctor.availability,
    }))
}

#[derive(Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub profile: DoctorProfile,
}

/// `POST /api/doctors`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Envelope<DoctorView>>), ApiError> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to create doctor";
    if req.profile.license_number.trim().is_empty() {
        return Err(ApiError::BadRequest("License number is required".into()));
    }
    let account = NewAccount {
        name: req.name,
        email: req.email,
        password: req.password,
        phone: req.phone,
    };
    let mut conn = ctx.core.open_db().context(FAILED)?;
    let doctor = accounts::register_doctor(&mut conn, &account, req.profile).context(FAILED)?;
    Ok(created("Doctor created successfully", doctor))
}

/// Load a doctor and refuse doctors editing someone else's profile.
fn editable_doctor(
    conn: &rusqlite::Connection,
    me: &AuthUser,
    id: &Uuid,
    operation: &str,
) -> Result<DoctorView, ApiError> {
    me.require(&[Role::Admin, Role::Doctor])?;
    let view = repository::get_doctor(conn, id)
        .context(operation)?
        .ok_or_else(|| ApiError::not_found("Doctor"))?;
    if me.role == Role::Doctor && view.doctor.user_id != me.id {
        tracing::warn!(user_id = %me.id, doctor_id = %id, "Doctor edit of foreign profile refused");
        return Err(ApiError::Forbidden("You can only update your own profile".into()));
    }
    Ok(view)
}

#[derive(Deserialize)]
pub struct UpdateDoctorRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub fields: DoctorUpdate,
}

/// `PUT /api/doctors/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateDoctorRequest>,
) -> ApiResult<DoctorView> {
    const FAILED: &str = "Failed to update doctor";
    let conn = ctx.core.open_db().context(FAILED)?;
    let existing = editable_doctor(&conn, &me, &id, FAILED)?;
    if req.fields.experience.is_some_and(|e| e < 0) {
        return Err(ApiError::BadRequest("Experience cannot be negative".into()));
    }

    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if name.is_some() || req.phone.is_some() {
        repository::update_user_contact(&conn, &existing.doctor.user_id, name, req.phone.as_deref())
            .context(FAILED)?;
    }
    repository::update_doctor(&conn, &id, &req.fields).context(FAILED)?;

    let doctor = repository::get_doctor(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Doctor"))?;
    Ok(ok_with("Doctor updated successfully", doctor))
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub schedule: Option<serde_json::Value>,
    pub availability: Option<Availability>,
}

/// `PUT /api/doctors/:id/schedule`
pub async fn update_schedule(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ScheduleRequest>,
) -> ApiResult<DoctorView> {
    const FAILED: &str = "Failed to update schedule";
    let conn = ctx.core.open_db().context(FAILED)?;
    editable_doctor(&conn, &me, &id, FAILED)?;

    let update = DoctorUpdate {
        schedule: req.schedule,
        availability: req.availability,
        ..Default::default()
    };
    repository::update_doctor(&conn, &id, &update).context(FAILED)?;
    if let Some(availability) = update.availability {
        tracing::info!(doctor_id = %id, availability = %availability, "Doctor availability changed");
    }

    let doctor = repository::get_doctor(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Doctor"))?;
    Ok(ok_with("Schedule updated successfully", doctor))
}

/// `DELETE /api/doctors/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to delete doctor";
    let conn = ctx.core.open_db().context(FAILED)?;
    if !repository::delete_doctor_with_user(&conn, &id).context(FAILED)? {
        return Err(ApiError::not_found("Doctor"));
    }
    tracing::info!(doctor_id = %id, by = %me.id, "Doctor deleted");
    Ok(done("Doctor deleted successfully"))
}
