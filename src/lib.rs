pub mod accounts; // User accounts and registration
pub mod api; // REST router, endpoints, server
pub mod authorization; // Role gates and row scoping
pub mod billing; // Invoices and payments
pub mod booking; // Appointment slot guard
pub mod config;
pub mod core_state; // Shared state: database path + token keys
pub mod crypto;
pub mod db;
pub mod inventory; // Stock levels and expiry
pub mod models;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Top-level startup failure.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("Admin bootstrap failed: {0}")]
    Bootstrap(#[from] core_state::CoreError),
    #[error("Cannot start async runtime: {0}")]
    Runtime(std::io::Error),
    #[error(transparent)]
    Server(#[from] api::ServerError),
}

pub fn run() -> Result<(), RunError> {
    // A missing .env file is fine; the process environment still applies
    let _ = dotenv::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::ServerConfig::from_env()?;
    tracing::info!(?config, "Configuration loaded");
    if config.jwt_secret_generated {
        tracing::warn!("JWT_SECRET not set; using a random secret, tokens will not survive a restart");
    }

    let core = Arc::new(core_state::CoreState::from_config(&config));
    if let Some(admin) = &config.admin {
        core_state::bootstrap_admin(&core, admin)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RunError::Runtime)?;
    runtime.block_on(api::serve(core, config.addr))?;

    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
