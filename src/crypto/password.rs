//! Password hashing: PBKDF2-HMAC-SHA256 with a per-password random salt.
//!
//! Stored form: `pbkdf2_sha256$<iterations>$<salt b64>$<hash b64>`. The
//! iteration count travels with the hash so it can be raised later without
//! invalidating existing accounts.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::CryptoError;

const SCHEME: &str = "pbkdf2_sha256";
pub const SALT_LENGTH: usize = 16;
pub const HASH_LENGTH: usize = 32;
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[cfg(not(test))]
pub const PBKDF2_ITERATIONS: u32 = 210_000;
#[cfg(test)]
pub const PBKDF2_ITERATIONS: u32 = 1_000;

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

pub fn validate_password(password: &str) -> Result<(), CryptoError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CryptoError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut hash = derive(password, &salt, PBKDF2_ITERATIONS);
    let encoded = format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    );
    hash.zeroize();
    encoded
}

/// Check a password against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, CryptoError> {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CryptoError::MalformedHash);
    };
    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
    if iterations == 0 {
        return Err(CryptoError::MalformedHash);
    }
    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|_| CryptoError::MalformedHash)?;
    let expected = STANDARD_NO_PAD
        .decode(expected)
        .map_err(|_| CryptoError::MalformedHash)?;
    if expected.len() != HASH_LENGTH {
        return Err(CryptoError::MalformedHash);
    }

    let mut actual = derive(password, &salt, iterations);
    let matches = actual.ct_eq(expected.as_slice()).unwrap_u8() == 1;
    actual.zeroize();
    Ok(matches)
}
