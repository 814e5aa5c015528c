//! User administration (admin only).

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::{ApiError, Context};
use crate::api::types::{
    done, listing, ok, ok_with, ApiContext, ApiJson, ApiPath, ApiQuery, ApiResult, AuthUser,
    Envelope, Listing,
};
use crate::db::repository;
use crate::models::*;

#[derive(Deserialize)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
}

/// `GET /api/users`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiQuery(q): ApiQuery<UserListQuery>,
) -> ApiResult<Listing> {
    me.require(&[Role::Admin])?;
    let page = Page::new(q.page, q.limit);
    let filter = UserFilter {
        role: q.role,
        status: q.status,
        search: q.search,
    };
    let conn = ctx.core.open_db().context("Failed to get users")?;
    let (users, total) = repository::list_users(&conn, &filter, page).context("Failed to get users")?;
    Ok(ok(listing("users", users, page.pagination(total))?))
}

/// `GET /api/users/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<User> {
    me.require(&[Role::Admin])?;
    let conn = ctx.core.open_db().context("Failed to get user")?;
    let user = repository::get_user(&conn, &id)
        .context("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(ok(user))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: UserStatus,
}

/// `PUT /api/users/:id/status`
pub async fn set_status(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<User> {
    me.require(&[Role::Admin])?;
    if id == me.id && req.status == UserStatus::Inactive {
        return Err(ApiError::BadRequest("You cannot deactivate your own account".into()));
    }
    const FAILED: &str = "Failed to update user status";
    let conn = ctx.core.open_db().context(FAILED)?;
    if !repository::update_user_status(&conn, &id, req.status).context(FAILED)? {
        return Err(ApiError::not_found("User"));
    }
    tracing::info!(user_id = %id, status = %req.status, by = %me.id, "User status changed");
    let user = repository::get_user(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(ok_with("User status updated successfully", user))
}

/// `DELETE /api/users/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    me.require(&[Role::Admin])?;
    if id == me.id {
        return Err(ApiError::BadRequest("You cannot delete your own account".into()));
    }
    let conn = ctx.core.open_db().context("Failed to delete user")?;
    if !repository::delete_user(&conn, &id).context("Failed to delete user")? {
        return Err(ApiError::not_found("User"));
    }
    tracing::info!(user_id = %id, by = %me.id, "User deleted");
    Ok(done("User deleted successfully"))
}
