use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Availability;
use super::money::Money;
use super::user::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: String,
    pub qualification: String,
    pub experience: i64,
    pub license_number: String,
    pub consultation_fee: Money,
    /// Free-form weekly schedule document.
    pub schedule: Option<serde_json::Value>,
    pub availability: Availability,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorView {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub specialization: String,
    pub qualification: String,
    #[serde(default)]
    pub experience: i64,
    pub license_number: String,
    #[serde(default)]
    pub consultation_fee: Money,
    pub schedule: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorUpdate {
    pub specialization: Option<String>,
    pub qualification: Option<String>,
    pub experience: Option<i64>,
    pub consultation_fee: Option<Money>,
    pub schedule: Option<serde_json::Value>,
    pub availability: Option<Availability>,
}

/// Response of the schedule lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSchedule {
    pub id: Uuid,
    pub name: String,
    pub schedule: Option<serde_json::Value>,
    pub availability: Availability,
}
