//! Shared application state for the HTTP transport.
//!
//! `CoreState` is built once at start-up and shared via `Arc`. It holds
//! no mutable state: every request opens its own database connection.

use std::path::{Path, PathBuf};

use chrono::Duration;

use crate::accounts::{self, AccountError, NewAccount};
use crate::config::{AdminBootstrap, ServerConfig};
use crate::crypto::TokenKeys;
use crate::db;
use crate::models::Role;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    db_path: PathBuf,
    tokens: TokenKeys,
}

impl CoreState {
    pub fn new(db_path: PathBuf, tokens: TokenKeys) -> Self {
        Self { db_path, tokens }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.database_path.clone(),
            TokenKeys::new(&config.jwt_secret, Duration::days(config.jwt_expiry_days)),
        )
    }

    /// Open a connection for one request. Migrations are idempotent.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn tokens(&self) -> &TokenKeys {
        &self.tokens
    }
}

// ═══════════════════════════════════════════════════════════
// Start-up
// ═══════════════════════════════════════════════════════════

/// Create the configured admin account unless that e-mail already exists.
/// Returns `true` when an account was created.
pub fn bootstrap_admin(state: &CoreState, admin: &AdminBootstrap) -> Result<bool, CoreError> {
    let conn = state.open_db()?;
    let email = accounts::normalize_email(&admin.email);
    if db::repository::email_exists(&conn, &email)? {
        tracing::debug!(email = %email, "Bootstrap admin already present");
        return Ok(false);
    }
    let account = NewAccount {
        name: admin.name.clone(),
        email,
        password: admin.password.clone(),
        phone: None,
    };
    let user = accounts::create_user(&conn, &account, Role::Admin)?;
    tracing::info!(user_id = %user.id, "Bootstrap admin created");
    Ok(true)
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Account error: {0}")]
    Account(#[from] AccountError),
}
