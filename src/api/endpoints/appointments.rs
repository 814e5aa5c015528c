//! Appointment endpoints. Doctors and patients only ever see their own rows.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::{ApiError, Context};
use crate::api::types::{
    created, listing, ok, ok_with, today, ApiContext, ApiJson, ApiPath, ApiQuery, ApiResult,
    AuthUser, Envelope, Listing,
};
use crate::authorization::AccessScope;
use crate::booking;
use crate::db::repository;
use crate::models::*;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

/// `GET /api/appointments`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiQuery(q): ApiQuery<AppointmentListQuery>,
) -> ApiResult<Listing> {
    const FAILED: &str = "Failed to get appointments";
    let page = Page::new(q.page, q.limit);
    let conn = ctx.core.open_db().context(FAILED)?;
    let requested = Scope {
        doctor_id: q.doctor_id,
        patient_id: q.patient_id,
    };
    let Some(scope) = me.scope(&conn)?.restrict(requested) else {
        return Ok(ok(listing("appointments", Vec::<AppointmentView>::new(), page.pagination(0))?));
    };

    let filter = AppointmentFilter {
        status: q.status,
        date: q.date,
        scope,
    };
    let (rows, total) = repository::list_appointments(&conn, &filter, page).context(FAILED)?;
    Ok(ok(listing("appointments", rows, page.pagination(total))?))
}

/// `GET /api/appointments/stats`
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
) -> ApiResult<AppointmentStats> {
    me.require(&[Role::Admin, Role::Doctor])?;
    const FAILED: &str = "Failed to get appointment statistics";
    let conn = ctx.core.open_db().context(FAILED)?;
    let Some(scope) = me.scope(&conn)?.restrict(Scope::default()) else {
        return Ok(ok(AppointmentStats::default()));
    };
    let stats = repository::appointment_stats(&conn, today(), &scope).context(FAILED)?;
    Ok(ok(stats))
}

/// `GET /api/appointments/today`
pub async fn today_list(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
) -> ApiResult<Vec<AppointmentView>> {
    const FAILED: &str = "Failed to get today's appointments";
    let conn = ctx.core.open_db().context(FAILED)?;
    let Some(scope) = me.scope(&conn)?.restrict(Scope::default()) else {
        return Ok(ok(Vec::new()));
    };
    let rows = repository::list_appointments_on(&conn, today(), &scope).context(FAILED)?;
    Ok(ok(rows))
}

/// Load an appointment the caller is allowed to see.
fn visible_appointment(
    conn: &rusqlite::Connection,
    me: &AuthUser,
    id: &Uuid,
    operation: &str,
) -> Result<AppointmentView, ApiError> {
    let scope = me.scope(conn)?;
    let view = repository::get_appointment_view(conn, id)
        .context(operation)?
        .ok_or_else(|| ApiError::not_found("Appointment"))?;
    let appt = &view.appointment;
    if !scope.permits(&appt.patient_id, Some(&appt.doctor_id)) {
        tracing::warn!(user_id = %me.id, appointment_id = %id, "Appointment access refused");
        return Err(ApiError::Forbidden("Access denied".into()));
    }
    Ok(view)
}

/// `GET /api/appointments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<AppointmentView> {
    const FAILED: &str = "Failed to get appointment";
    let conn = ctx.core.open_db().context(FAILED)?;
    Ok(ok(visible_appointment(&conn, &me, &id, FAILED)?))
}

/// `POST /api/appointments`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<NewAppointment>,
) -> Result<(StatusCode, Json<Envelope<AppointmentView>>), ApiError> {
    const FAILED: &str = "Failed to create appointment";
    let mut conn = ctx.core.open_db().context(FAILED)?;
    match me.scope(&conn)? {
        AccessScope::Patient(own) if own == req.patient_id => {}
        AccessScope::Patient(_) | AccessScope::Nothing if me.role == Role::Patient => {
            return Err(ApiError::Forbidden(
                "You can only book appointments for yourself".into(),
            ));
        }
        _ => {}
    }

    let appointment = booking::book(&mut conn, req).context(FAILED)?;
    let view = repository::get_appointment_view(&conn, &appointment.id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Appointment"))?;
    Ok(created("Appointment created successfully", view))
}

/// `PUT /api/appointments/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AppointmentUpdate>,
) -> ApiResult<AppointmentView> {
    const FAILED: &str = "Failed to update appointment";
    let mut conn = ctx.core.open_db().context(FAILED)?;
    visible_appointment(&conn, &me, &id, FAILED)?;

    booking::update(&mut conn, &id, req).context(FAILED)?;
    let view = repository::get_appointment_view(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Appointment"))?;
    Ok(ok_with("Appointment updated successfully", view))
}

/// `PUT /api/appointments/:id/cancel`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<AppointmentView> {
    const FAILED: &str = "Failed to cancel appointment";
    let conn = ctx.core.open_db().context(FAILED)?;
    visible_appointment(&conn, &me, &id, FAILED)?;

    booking::cancel(&conn, &id).context(FAILED)?;
    let view = repository::get_appointment_view(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Appointment"))?;
    Ok(ok_with("Appointment cancelled successfully", view))
}
