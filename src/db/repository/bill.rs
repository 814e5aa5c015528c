use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{json_col, uuid_col, Conditions};
use crate::db::DatabaseError;
use crate::models::*;

const BILL_COLUMNS: &str = "b.id, b.patient_id, b.invoice_number, b.services, b.total_amount,
     b.paid_amount, b.balance_amount, b.status, b.bill_date, b.due_date, b.payment_method,
     b.notes, b.created_at, b.updated_at";

fn bill_from_row(row: &Row<'_>) -> rusqlite::Result<Bill> {
    Ok(Bill {
        id: uuid_col(row, 0)?,
        patient_id: uuid_col(row, 1)?,
        invoice_number: row.get(2)?,
        services: json_col(row, 3)?,
        total_amount: row.get(4)?,
        paid_amount: row.get(5)?,
        balance_amount: row.get(6)?,
        status: row.get(7)?,
        bill_date: row.get(8)?,
        due_date: row.get(9)?,
        payment_method: row.get(10)?,
        notes: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn bill_view_from_row(row: &Row<'_>) -> rusqlite::Result<BillView> {
    let bill = bill_from_row(row)?;
    let patient = PartyRef {
        id: bill.patient_id,
        name: row.get(14)?,
        email: row.get(15)?,
        phone: row.get(16)?,
    };
    Ok(BillView { bill, patient })
}

fn view_select() -> String {
    format!(
        "SELECT {BILL_COLUMNS}, pu.name, pu.email, pu.phone
         FROM bills b
         JOIN patients p ON p.id = b.patient_id
         JOIN users pu ON pu.id = p.user_id"
    )
}

fn services_text(services: &[ServiceLine]) -> Result<String, DatabaseError> {
    serde_json::to_string(services).map_err(|e| DatabaseError::CorruptValue {
        column: "bills.services",
        reason: e.to_string(),
    })
}

pub fn insert_bill(conn: &Connection, bill: &Bill) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO bills (id, patient_id, invoice_number, services, total_amount, paid_amount,
                            balance_amount, status, bill_date, due_date, payment_method, notes,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            bill.id.to_string(),
            bill.patient_id.to_string(),
            bill.invoice_number,
            services_text(&bill.services)?,
            bill.total_amount,
            bill.paid_amount,
            bill.balance_amount,
            bill.status,
            bill.bill_date,
            bill.due_date,
            bill.payment_method,
            bill.notes,
            bill.created_at,
            bill.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_bill(conn: &Connection, id: &Uuid) -> Result<Option<Bill>, DatabaseError> {
    let bill = conn
        .query_row(
            &format!("SELECT {BILL_COLUMNS} FROM bills b WHERE b.id = ?1"),
            params![id.to_string()],
            bill_from_row,
        )
        .optional()?;
    Ok(bill)
}

pub fn get_bill_view(conn: &Connection, id: &Uuid) -> Result<Option<BillView>, DatabaseError> {
    let view = conn
        .query_row(
            &format!("{} WHERE b.id = ?1", view_select()),
            params![id.to_string()],
            bill_view_from_row,
        )
        .optional()?;
    Ok(view)
}

pub fn count_bills(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM bills", [], |row| row.get(0))?;
    Ok(count)
}

pub fn invoice_number_exists(conn: &Connection, invoice: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bills WHERE invoice_number = ?1",
        params![invoice],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Paginated listing, newest bill date first.
pub fn list_bills(
    conn: &Connection,
    filter: &BillFilter,
    page: Page,
) -> Result<(Vec<BillView>, i64), DatabaseError> {
    let mut cond = Conditions::default();
    if let Some(status) = filter.status {
        cond.and("b.status = {}", status);
    }
    if let Some(patient_id) = filter.scope.patient_id {
        cond.and("b.patient_id = {}", patient_id.to_string());
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM bills b WHERE 1=1{}", cond.sql()),
        cond.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = cond.bind(i64::from(page.limit));
    let offset = cond.bind(page.offset());
    let sql = format!(
        "{} WHERE 1=1{}
         ORDER BY b.bill_date DESC, b.created_at DESC LIMIT {limit} OFFSET {offset}",
        view_select(),
        cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(cond.params().as_slice(), bill_view_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, total))
}

/// Overwrite the mutable columns of an existing bill.
pub fn update_bill(conn: &Connection, bill: &Bill) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE bills SET
            services = ?2, total_amount = ?3, paid_amount = ?4, balance_amount = ?5,
            status = ?6, due_date = ?7, payment_method = ?8, notes = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            bill.id.to_string(),
            services_text(&bill.services)?,
            bill.total_amount,
            bill.paid_amount,
            bill.balance_amount,
            bill.status,
            bill.due_date,
            bill.payment_method,
            bill.notes,
            Utc::now(),
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete_bill(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM bills WHERE id = ?1", params![id.to_string()])?;
    Ok(changed > 0)
}

pub fn bill_stats(conn: &Connection) -> Result<BillStats, DatabaseError> {
    let stats = conn.query_row(
        "SELECT COALESCE(SUM(paid_amount), 0),
                COALESCE(SUM(CASE WHEN status != 'paid' THEN balance_amount ELSE 0 END), 0),
                COUNT(*),
                COALESCE(SUM(status = 'paid'), 0),
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'overdue'), 0)
         FROM bills",
        [],
        |row| {
            Ok(BillStats {
                total_revenue: row.get(0)?,
                pending_amount: row.get(1)?,
                total_bills: row.get(2)?,
                paid_bills: row.get(3)?,
                pending_bills: row.get(4)?,
                overdue_bills: row.get(5)?,
            })
        },
    )?;
    Ok(stats)
}
