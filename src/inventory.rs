//! Inventory stock status.
//!
//! Status is never stored from client input: it is re-derived from
//! quantity, reorder level and expiry date before every write.

use chrono::{Days, NaiveDate, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::*;

/// Window used by the expiring-soon listing.
pub const EXPIRY_WARNING_DAYS: u64 = 30;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Item not found")]
    NotFound,
    #[error("Insufficient stock")]
    InsufficientStock,
    #[error("Invalid operation. Use \"add\" or \"subtract\"")]
    InvalidOperation,
    #[error("Quantity must be a positive number")]
    InvalidQuantity,
    #[error("{0} cannot be negative")]
    Negative(&'static str),
    #[error("Item name is required")]
    MissingName,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Quantity thresholds first, then expiry overrides all of them.
pub fn derive_status(
    quantity: i64,
    min_quantity: i64,
    expiry_date: Option<NaiveDate>,
    today: NaiveDate,
) -> StockStatus {
    let by_quantity = if quantity <= 0 {
        StockStatus::OutOfStock
    } else if quantity <= min_quantity {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    };
    match expiry_date {
        Some(expiry) if expiry < today => StockStatus::Expired,
        _ => by_quantity,
    }
}

fn refresh_status(item: &mut InventoryItem, today: NaiveDate) {
    item.status = derive_status(item.quantity, item.min_quantity, item.expiry_date, today);
}

fn check_amounts(quantity: i64, min_quantity: i64, unit_price: Money) -> Result<(), InventoryError> {
    if quantity < 0 {
        return Err(InventoryError::Negative("Quantity"));
    }
    if min_quantity < 0 {
        return Err(InventoryError::Negative("Minimum quantity"));
    }
    if unit_price.cents() < 0 {
        return Err(InventoryError::Negative("Unit price"));
    }
    Ok(())
}

/// Direction of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOperation {
    Add,
    Subtract,
}

impl std::str::FromStr for StockOperation {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "subtract" => Ok(Self::Subtract),
            _ => Err(InventoryError::InvalidOperation),
        }
    }
}

pub fn create_item(
    conn: &Connection,
    request: NewInventoryItem,
    today: NaiveDate,
) -> Result<InventoryItem, InventoryError> {
    if request.item_name.trim().is_empty() {
        return Err(InventoryError::MissingName);
    }
    let min_quantity = request.min_quantity.unwrap_or(DEFAULT_MIN_QUANTITY);
    check_amounts(request.quantity, min_quantity, request.unit_price)?;

    let now = Utc::now();
    let mut item = InventoryItem {
        id: Uuid::new_v4(),
        item_name: request.item_name.trim().to_string(),
        category: request.category,
        quantity: request.quantity,
        min_quantity,
        unit_price: request.unit_price,
        supplier: request.supplier,
        expiry_date: request.expiry_date,
        batch_number: request.batch_number,
        description: request.description,
        status: StockStatus::InStock,
        created_at: now,
        updated_at: now,
    };
    refresh_status(&mut item, today);
    db::insert_inventory_item(conn, &item)?;
    Ok(item)
}

pub fn update_item(
    conn: &Connection,
    id: &Uuid,
    changes: InventoryUpdate,
    today: NaiveDate,
) -> Result<InventoryItem, InventoryError> {
    let mut item = db::get_inventory_item(conn, id)?.ok_or(InventoryError::NotFound)?;

    if let Some(name) = changes.item_name {
        if name.trim().is_empty() {
            return Err(InventoryError::MissingName);
        }
        item.item_name = name.trim().to_string();
    }
    if let Some(category) = changes.category {
        item.category = category;
    }
    if let Some(quantity) = changes.quantity {
        item.quantity = quantity;
    }
    if let Some(min_quantity) = changes.min_quantity {
        item.min_quantity = min_quantity;
    }
    if let Some(unit_price) = changes.unit_price {
        item.unit_price = unit_price;
    }
    if let Some(supplier) = changes.supplier {
        item.supplier = supplier;
    }
    if let Some(expiry_date) = changes.expiry_date {
        item.expiry_date = expiry_date;
    }
    if let Some(batch_number) = changes.batch_number {
        item.batch_number = batch_number;
    }
    if let Some(description) = changes.description {
        item.description = description;
    }
    check_amounts(item.quantity, item.min_quantity, item.unit_price)?;

    refresh_status(&mut item, today);
    db::update_inventory_item(conn, &item)?;
    Ok(item)
}

/// Add or remove `quantity` units. Subtracting below zero is refused.
pub fn adjust_stock(
    conn: &Connection,
    id: &Uuid,
    quantity: i64,
    operation: StockOperation,
    today: NaiveDate,
) -> Result<InventoryItem, InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity);
    }
    let mut item = db::get_inventory_item(conn, id)?.ok_or(InventoryError::NotFound)?;

    item.quantity = match operation {
        StockOperation::Add => item
            .quantity
            .checked_add(quantity)
            .ok_or(InventoryError::InvalidQuantity)?,
        StockOperation::Subtract if quantity > item.quantity => {
            tracing::warn!(item_id = %id, on_hand = item.quantity, requested = quantity, "Stock adjustment rejected");
            return Err(InventoryError::InsufficientStock);
        }
        StockOperation::Subtract => item.quantity - quantity,
    };

    refresh_status(&mut item, today);
    db::update_inventory_item(conn, &item)?;
    tracing::info!(item_id = %id, quantity = item.quantity, status = %item.status, "Stock adjusted");
    Ok(item)
}

pub fn delete_item(conn: &Connection, id: &Uuid) -> Result<(), InventoryError> {
    if !db::delete_inventory_item(conn, id)? {
        return Err(InventoryError::NotFound);
    }
    Ok(())
}

/// Bring stored statuses up to date with the calendar before a read.
pub fn sweep_expired(conn: &Connection, today: NaiveDate) -> Result<(), InventoryError> {
    let changed = db::mark_expired(conn, today)?;
    if changed > 0 {
        tracing::info!(count = changed, "Inventory items marked expired");
    }
    Ok(())
}

/// Items expiring between today and the warning horizon, inclusive.
pub fn expiring_soon(conn: &Connection, today: NaiveDate) -> Result<Vec<InventoryItem>, InventoryError> {
    let until = today
        .checked_add_days(Days::new(EXPIRY_WARNING_DAYS))
        .unwrap_or(NaiveDate::MAX);
    Ok(db::list_expiring_between(conn, today, until)?)
}
