pub mod password;
pub mod token;

pub use password::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Malformed password hash")]
    MalformedHash,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token signing failed: {0}")]
    Signing(String),
}
