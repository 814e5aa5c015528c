use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Gender;
use super::user::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub blood_group: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Patient row joined with its owning user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub user: UserSummary,
}

/// Profile fields supplied when a patient is created.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub blood_group: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
}

/// Partial patient update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_group: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStats {
    pub total: i64,
    pub active: i64,
    pub male: i64,
    pub female: i64,
}
