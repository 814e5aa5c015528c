//! Account endpoints: register, login, own profile, password change.
//!
//! `POST /api/auth/register` and `POST /api/auth/login` are public; the
//! rest require a bearer token.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::accounts::{self, AccountError, NewAccount};
use crate::api::error::{ApiError, Context};
use crate::api::types::{created, done, ok, ok_with, ApiContext, ApiJson, ApiResult, AuthUser, Envelope};
use crate::crypto::{hash_password, validate_password, verify_password};
use crate::db::repository;
use crate::models::*;

/// A user with whichever profile row it owns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub patient_profile: Option<Patient>,
    pub doctor_profile: Option<Doctor>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserProfile,
    pub token: String,
}

fn load_profile(conn: &rusqlite::Connection, user: User) -> Result<UserProfile, ApiError> {
    let patient_profile = repository::get_patient_by_user(conn, &user.id)?.map(|v| v.patient);
    let doctor_profile = repository::get_doctor_by_user(conn, &user.id)?.map(|v| v.doctor);
    Ok(UserProfile {
        user,
        patient_profile,
        doctor_profile,
    })
}

// ─── Register ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
    pub phone: Option<String>,
}

/// `POST /api/auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<SessionResponse>>), ApiError> {
    let role = req.role.unwrap_or(Role::Patient);
    if role == Role::Admin {
        tracing::warn!("Self-registration as admin refused");
        return Err(ApiError::Forbidden("Cannot register as admin".into()));
    }

    let conn = ctx.core.open_db().context("Registration failed")?;
    let account = NewAccount {
        name: req.name,
        email: req.email,
        password: req.password,
        phone: req.phone,
    };
    let user = accounts::create_user(&conn, &account, role).map_err(|e| match e {
        AccountError::EmailTaken => ApiError::BadRequest("Email already registered".into()),
        other => other.into(),
    })
    .context("Registration failed")?;

    let token = ctx.core.tokens().issue(&user).context("Registration failed")?;
    let user = load_profile(&conn, user).context("Registration failed")?;
    Ok(created("Registration successful", SessionResponse { user, token }))
}

// ─── Login ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

const BAD_CREDENTIALS: &str = "Invalid email or password";

/// `POST /api/auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<SessionResponse> {
    let conn = ctx.core.open_db().context("Login failed")?;
    let email = accounts::normalize_email(&req.email);

    let Some(user) = repository::get_user_by_email(&conn, &email).context("Login failed")? else {
        tracing::warn!("Login for unknown e-mail");
        return Err(ApiError::AuthFailed(BAD_CREDENTIALS));
    };
    if !verify_password(&req.password, &user.password_hash).context("Login failed")? {
        tracing::warn!(user_id = %user.id, "Login with wrong password");
        return Err(ApiError::AuthFailed(BAD_CREDENTIALS));
    }
    if !user.is_active() {
        tracing::warn!(user_id = %user.id, "Login to inactive account");
        return Err(ApiError::Forbidden("Account is not active".into()));
    }

    let token = ctx.core.tokens().issue(&user).context("Login failed")?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
    let user = load_profile(&conn, user).context("Login failed")?;
    Ok(ok_with("Login successful", SessionResponse { user, token }))
}

// ─── Own profile ──────────────────────────────────────────────────────────────

/// `GET /api/auth/profile`
pub async fn profile(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
) -> ApiResult<UserProfile> {
    let conn = ctx.core.open_db().context("Failed to get profile")?;
    let user = repository::get_user(&conn, &me.id)
        .context("Failed to get profile")?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(ok(load_profile(&conn, user).context("Failed to get profile")?))
}

/// Contact fields plus the caller's own profile fields.
#[derive(Deserialize)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(flatten)]
    pub patient: PatientUpdate,
    #[serde(flatten)]
    pub doctor: DoctorUpdate,
}

/// `PUT /api/auth/profile`
pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<ProfileUpdateRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    const FAILED: &str = "Failed to update profile";
    let name = req.name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(AccountError::MissingName.into());
    }

    let conn = ctx.core.open_db().context(FAILED)?;
    if !repository::update_user_contact(&conn, &me.id, name, req.phone.as_deref()).context(FAILED)? {
        return Err(ApiError::not_found("User"));
    }

    match me.role {
        Role::Patient => {
            if let Some(view) = repository::get_patient_by_user(&conn, &me.id).context(FAILED)? {
                repository::update_patient(&conn, &view.patient.id, &req.patient).context(FAILED)?;
            }
        }
        Role::Doctor => {
            if let Some(view) = repository::get_doctor_by_user(&conn, &me.id).context(FAILED)? {
                repository::update_doctor(&conn, &view.doctor.id, &req.doctor).context(FAILED)?;
            }
        }
        Role::Admin | Role::Nurse => {}
    }
    Ok(done("Profile updated successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// `PUT /api/auth/change-password`
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    const FAILED: &str = "Failed to change password";
    let conn = ctx.core.open_db().context(FAILED)?;
    let user = repository::get_user(&conn, &me.id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if !verify_password(&req.current_password, &user.password_hash).context(FAILED)? {
        tracing::warn!(user_id = %me.id, "Password change with wrong current password");
        return Err(ApiError::AuthFailed("Current password is incorrect"));
    }
    validate_password(&req.new_password)?;
    repository::update_user_password(&conn, &me.id, &hash_password(&req.new_password))
        .context(FAILED)?;
    tracing::info!(user_id = %me.id, "Password changed");
    Ok(done("Password changed successfully"))
}
