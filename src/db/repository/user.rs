use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{like_pattern, uuid_col, Conditions};
use crate::db::DatabaseError;
use crate::models::*;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, phone, status, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        phone: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, phone, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user.id.to_string(),
            user.name,
            user.email,
            user.password_hash,
            user.role,
            user.phone,
            user.status,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// E-mail lookup is case-insensitive (column collation).
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email.trim()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?1",
        params![email.trim()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_users(
    conn: &Connection,
    filter: &UserFilter,
    page: Page,
) -> Result<(Vec<User>, i64), DatabaseError> {
    let mut cond = Conditions::default();
    if let Some(role) = filter.role {
        cond.and("role = {}", role);
    }
    if let Some(status) = filter.status {
        cond.and("status = {}", status);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        cond.and(
            "(name LIKE {} COLLATE NOCASE OR email LIKE {} COLLATE NOCASE)",
            like_pattern(search),
        );
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users WHERE 1=1{}", cond.sql()),
        cond.params().as_slice(),
        |row| row.get(0),
    )?;

    let limit = cond.bind(i64::from(page.limit));
    let offset = cond.bind(page.offset());
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE 1=1{}
         ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}",
        cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(cond.params().as_slice(), user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((users, total))
}

/// Replace name and/or phone. Returns false when the user does not exist.
pub fn update_user_contact(
    conn: &Connection,
    id: &Uuid,
    name: Option<&str>,
    phone: Option<&str>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET name = COALESCE(?2, name), phone = COALESCE(?3, phone), updated_at = ?4
         WHERE id = ?1",
        params![id.to_string(), name, phone, Utc::now()],
    )?;
    Ok(changed > 0)
}

pub fn update_user_password(
    conn: &Connection,
    id: &Uuid,
    password_hash: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), password_hash, Utc::now()],
    )?;
    Ok(changed > 0)
}

pub fn update_user_status(
    conn: &Connection,
    id: &Uuid,
    status: UserStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status, Utc::now()],
    )?;
    Ok(changed > 0)
}

/// Hard delete; patient/doctor profiles and their rows cascade.
pub fn delete_user(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
    Ok(changed > 0)
}
