//! Inventory endpoints. Every read refreshes expiry statuses first.

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
use crate::db::repository;
use crate::inventory::{self as stock, StockOperation};
use crate::models::*;

/// Open a connection with expiry statuses brought up to date.
fn fresh_conn(ctx: &ApiContext, operation: &str) -> Result<rusqlite::Connection, ApiError> {
    let conn = ctx.core.open_db().context(operation)?;
    stock::sweep_expired(&conn, today()).context(operation)?;
    Ok(conn)
}

#[derive(Deserialize)]
pub struct InventoryListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<InventoryCategory>,
    pub status: Option<StockStatus>,
    pub search: Option<String>,
}

/// `GET /api/inventory`
pub async fn list(
    State(ctx): State<ApiContext>,
    ApiQuery(q): ApiQuery<InventoryListQuery>,
) -> ApiResult<Listing> {
    const FAILED: &str = "Failed to get inventory items";
    let page = Page::new(q.page, q.limit);
    let filter = InventoryFilter {
        category: q.category,
        status: q.status,
        search: q.search,
    };
    let conn = fresh_conn(&ctx, FAILED)?;
    let (items, total) = repository::list_inventory(&conn, &filter, page).context(FAILED)?;
    Ok(ok(listing("items", items, page.pagination(total))?))
}

/// `GET /api/inventory/stats`
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
) -> ApiResult<InventoryStats> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to get inventory statistics";
    let conn = fresh_conn(&ctx, FAILED)?;
    Ok(ok(repository::inventory_stats(&conn).context(FAILED)?))
}

/// `GET /api/inventory/low-stock`
pub async fn low_stock(State(ctx): State<ApiContext>) -> ApiResult<Vec<InventoryItem>> {
    const FAILED: &str = "Failed to get low stock items";
    let conn = fresh_conn(&ctx, FAILED)?;
    Ok(ok(repository::list_low_stock(&conn).context(FAILED)?))
}

/// `GET /api/inventory/expired`
pub async fn expired(State(ctx): State<ApiContext>) -> ApiResult<Vec<InventoryItem>> {
    const FAILED: &str = "Failed to get expired items";
    let conn = fresh_conn(&ctx, FAILED)?;
    Ok(ok(repository::list_expired(&conn, today()).context(FAILED)?))
}

/// `GET /api/inventory/expiring-soon`
pub async fn expiring_soon(State(ctx): State<ApiContext>) -> ApiResult<Vec<InventoryItem>> {
    const FAILED: &str = "Failed to get expiring soon items";
    let conn = fresh_conn(&ctx, FAILED)?;
    Ok(ok(stock::expiring_soon(&conn, today()).context(FAILED)?))
}

/// `GET /api/inventory/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<InventoryItem> {
    const FAILED: &str = "Failed to get item";
    let conn = fresh_conn(&ctx, FAILED)?;
    let item = repository::get_inventory_item(&conn, &id)
        .context(FAILED)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    Ok(ok(item))
}

/// `POST /api/inventory`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiJson(req): ApiJson<NewInventoryItem>,
) -> Result<(StatusCode, Json<Envelope<InventoryItem>>), ApiError> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to create item";
    let conn = ctx.core.open_db().context(FAILED)?;
    let item = stock::create_item(&conn, req, today()).context(FAILED)?;
    tracing::info!(item_id = %item.id, status = %item.status, "Inventory item created");
    Ok(created("Item created successfully", item))
}

/// `PUT /api/inventory/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<InventoryUpdate>,
) -> ApiResult<InventoryItem> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to update item";
    let conn = ctx.core.open_db().context(FAILED)?;
    let item = stock::update_item(&conn, &id, req, today()).context(FAILED)?;
    Ok(ok_with("Item updated successfully", item))
}

#[derive(Deserialize)]
pub struct StockRequest {
    pub quantity: i64,
    pub operation: String,
}

/// `PUT /api/inventory/:id/stock`
pub async fn adjust(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StockRequest>,
) -> ApiResult<InventoryItem> {
    me.require(&[Role::Admin, Role::Nurse])?;
    const FAILED: &str = "Failed to update stock";
    let operation: StockOperation = req.operation.parse().context(FAILED)?;
    let conn = ctx.core.open_db().context(FAILED)?;
    let item = stock::adjust_stock(&conn, &id, req.quantity, operation, today()).context(FAILED)?;
    Ok(ok_with("Stock updated successfully", item))
}

/// `DELETE /api/inventory/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<AuthUser>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    me.require(&[Role::Admin])?;
    const FAILED: &str = "Failed to delete item";
    let conn = ctx.core.open_db().context(FAILED)?;
    stock::delete_item(&conn, &id).context(FAILED)?;
    tracing::info!(item_id = %id, by = %me.id, "Inventory item deleted");
    Ok(done("Item deleted successfully"))
}
