//! Tri-state fields for partial updates.
//!
//! A field missing from the request body leaves the stored value alone;
//! an explicit `null` clears it. Pair with `#[serde(default)]`:
//!
//! ```ignore
//! #[serde(default, deserialize_with = "patch::nullable")]
//! pub notes: Option<Option<String>>,
//! ```

use serde::{Deserialize, Deserializer};

/// Wraps whatever was present (value or `null`) in `Some`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
