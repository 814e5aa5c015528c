use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use rand::RngCore;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Medicore";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_JWT_EXPIRY_DAYS: i64 = 7;
const GENERATED_SECRET_LENGTH: usize = 32;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "medicore_lib=info,tower_http=info"
}

/// Get the application data directory
/// ~/Medicore/ on all platforms
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// Default SQLite file location.
pub fn default_database_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("medicore.db"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine home directory; set DATABASE_PATH")]
    NoHomeDir,

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("ADMIN_EMAIL and ADMIN_PASSWORD must be set together")]
    IncompleteAdmin,
}

/// Credentials for the account created at start-up when missing.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Everything the server needs, read once at start-up.
#[derive(Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_path: PathBuf,
    pub jwt_secret: Vec<u8>,
    /// True when no `JWT_SECRET` was supplied and one was generated.
    pub jwt_secret_generated: bool,
    pub jwt_expiry_days: i64,
    pub admin: Option<AdminBootstrap>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("addr", &self.addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret_generated", &self.jwt_secret_generated)
            .field("jwt_expiry_days", &self.jwt_expiry_days)
            .field("admin", &self.admin.as_ref().map(|a| &a.email))
            .finish()
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host: IpAddr = match get("MEDICORE_HOST") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "MEDICORE_HOST",
                value: raw,
            })?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        let port: u16 = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let database_path = match get("DATABASE_PATH") {
            Some(raw) => PathBuf::from(raw),
            None => default_database_path()?,
        };

        let (jwt_secret, jwt_secret_generated) = match get("JWT_SECRET") {
            Some(raw) => (raw.into_bytes(), false),
            None => {
                let mut secret = vec![0u8; GENERATED_SECRET_LENGTH];
                rand::thread_rng().fill_bytes(&mut secret);
                (secret, true)
            }
        };

        let jwt_expiry_days = match get("JWT_EXPIRY_DAYS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(days) if days > 0 => days,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "JWT_EXPIRY_DAYS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_JWT_EXPIRY_DAYS,
        };

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                name: get("ADMIN_NAME").unwrap_or_else(|| "Administrator".into()),
                email,
                password,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteAdmin),
        };

        Ok(Self {
            addr: SocketAddr::new(host, port),
            database_path,
            jwt_secret,
            jwt_secret_generated,
            jwt_expiry_days,
            admin,
        })
    }
}
