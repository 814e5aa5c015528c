//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per table. All public functions are re-exported here.

mod appointment;
mod bill;
mod doctor;
mod inventory;
mod medical_record;
mod patient;
mod user;

use rusqlite::types::{ToSql, Type};
use rusqlite::Row;
use uuid::Uuid;

use crate::models::Scope;

pub use appointment::*;
pub use bill::*;
pub use doctor::*;
pub use inventory::*;
pub use medical_record::*;
pub use patient::*;
pub use user::*;

/// Read a TEXT column holding a UUID.
pub(crate) fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a TEXT column holding a JSON document.
pub(crate) fn json_col<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// `%term%` pattern for case-insensitive LIKE searches.
pub(crate) fn like_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

/// Dynamic `WHERE 1=1 AND ...` builder with numbered placeholders.
#[derive(Default)]
pub(crate) struct Conditions {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    /// Bind a value and return its placeholder.
    pub fn bind<T: ToSql + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }

    /// Append `AND <clause>`, with every `{}` in `clause` replaced by the
    /// placeholder of `value`.
    pub fn and<T: ToSql + 'static>(&mut self, clause: &str, value: T) {
        let placeholder = self.bind(value);
        self.sql.push_str(" AND ");
        self.sql.push_str(&clause.replace("{}", &placeholder));
    }

    /// Restrict to the patient and/or doctor named by `scope`.
    pub fn scoped(&mut self, scope: &Scope, patient_col: &str, doctor_col: &str) {
        if let Some(patient_id) = scope.patient_id {
            self.and(&format!("{patient_col} = {{}}"), patient_id.to_string());
        }
        if let Some(doctor_id) = scope.doctor_id {
            self.and(&format!("{doctor_col} = {{}}"), doctor_id.to_string());
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}
