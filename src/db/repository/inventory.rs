use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{like_pattern, uuid_col, Conditions};
use crate::db::DatabaseError;
use crate::models::*;

const ITEM_COLUMNS: &str = "id, item_name, category, quantity, min_quantity, unit_price, supplier,
     expiry_date, batch_number, description, status, created_at, updated_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    Ok(InventoryItem {
        id: uuid_col(row, 0)?,
        item_name: row.get(1)?,
        category: row.get(2)?,
        quantity: row.get(3)?,
        min_quantity: row.get(4)?,
        unit_price: row.get(5)?,
        supplier: row.get(6)?,
        expiry_date: row.get(7)?,
        batch_number: row.get(8)?,
        description: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn query_items(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<InventoryItem>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params, item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn insert_inventory_item(conn: &Connection, item: &InventoryItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO inventory (id, item_name, category, quantity, min_quantity, unit_price,
                                supplier, expiry_date, batch_number, description, status,
                                created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            item.id.to_string(),
            item.item_name,
            item.category,
            item.quantity,
            item.min_quantity,
            item.unit_price,
            item.supplier,
            item.expiry_date,
            item.batch_number,
            item.description,
            item.status,
            item.created_at,
            item.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_inventory_item(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<InventoryItem>, DatabaseError> {
    let item = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM inventory WHERE id = ?1"),
            params![id.to_string()],
            item_from_row,
        )
        .optional()?;
    Ok(item)
}

pub fn list_inventory(
    conn: &Connection,
    filter: &InventoryFilter,
    page: Page,
) -> Result<(Vec<InventoryItem>, i64), DatabaseError> {
    let mut cond = Conditions::default();
    if let Some(category) = filter.category {
        cond.and("category = {}", category);
    }
    if let Some(status) = filter.status {
        cond.and("status = {}", status);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        cond.and(
            "(item_name LIKE {} COLLATE NOCASE OR supplier LIKE {} COLLATE NOCASE)",
            like_pattern(search),
        );
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM inventory WHERE 1=1{}", cond.sql()),
        cond.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = cond.bind(i64::from(page.limit));
    let offset = cond.bind(page.offset());
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM inventory WHERE 1=1{}
         ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}",
        cond.sql()
    );
    let items = query_items(conn, &sql, cond.params().as_slice())?;
    Ok((items, total))
}

/// Items at or below their reorder level, emptiest first.
pub fn list_low_stock(conn: &Connection) -> Result<Vec<InventoryItem>, DatabaseError> {
    query_items(
        conn,
        &format!(
            "SELECT {ITEM_COLUMNS} FROM inventory
             WHERE status IN ('low_stock', 'out_of_stock')
             ORDER BY quantity ASC"
        ),
        &[],
    )
}

/// Items whose expiry date is before `today`.
pub fn list_expired(conn: &Connection, today: NaiveDate) -> Result<Vec<InventoryItem>, DatabaseError> {
    query_items(
        conn,
        &format!(
            "SELECT {ITEM_COLUMNS} FROM inventory
             WHERE expiry_date IS NOT NULL AND expiry_date < ?1
             ORDER BY expiry_date ASC"
        ),
        &[&today],
    )
}

/// Items expiring within `[today, until]`, soonest first.
pub fn list_expiring_between(
    conn: &Connection,
    today: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<InventoryItem>, DatabaseError> {
    query_items(
        conn,
        &format!(
            "SELECT {ITEM_COLUMNS} FROM inventory
             WHERE expiry_date IS NOT NULL AND expiry_date >= ?1 AND expiry_date <= ?2
             ORDER BY expiry_date ASC"
        ),
        &[&today, &until],
    )
}

/// Overwrite every mutable column, including the derived status.
pub fn update_inventory_item(conn: &Connection, item: &InventoryItem) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE inventory SET
            item_name = ?2, category = ?3, quantity = ?4, min_quantity = ?5, unit_price = ?6,
            supplier = ?7, expiry_date = ?8, batch_number = ?9, description = ?10,
            status = ?11, updated_at = ?12
         WHERE id = ?1",
        params![
            item.id.to_string(),
            item.item_name,
            item.category,
            item.quantity,
            item.min_quantity,
            item.unit_price,
            item.supplier,
            item.expiry_date,
            item.batch_number,
            item.description,
            item.status,
            Utc::now(),
        ],
    )?;
    Ok(changed > 0)
}

/// Flip items whose expiry date has passed to `expired`. Returns rows changed.
pub fn mark_expired(conn: &Connection, today: NaiveDate) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE inventory SET status = 'expired', updated_at = ?2
         WHERE expiry_date IS NOT NULL AND expiry_date < ?1 AND status != 'expired'",
        params![today, Utc::now()],
    )?;
    Ok(changed)
}

pub fn delete_inventory_item(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM inventory WHERE id = ?1", params![id.to_string()])?;
    Ok(changed > 0)
}

pub fn inventory_stats(conn: &Connection) -> Result<InventoryStats, DatabaseError> {
    let mut stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'low_stock'), 0),
                COALESCE(SUM(status = 'out_of_stock'), 0),
                COALESCE(SUM(status = 'expired'), 0),
                COALESCE(SUM(CASE WHEN status != 'expired' THEN quantity * unit_price ELSE 0 END), 0)
         FROM inventory",
        [],
        |row| {
            Ok(InventoryStats {
                total_items: row.get(0)?,
                low_stock_items: row.get(1)?,
                out_of_stock_items: row.get(2)?,
                expired_items: row.get(3)?,
                total_value: row.get(4)?,
                category_count: Vec::new(),
            })
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM inventory GROUP BY category ORDER BY category",
    )?;
    stats.category_count = stmt
        .query_map([], |row| {
            Ok(CategoryCount {
                category: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stats)
}
