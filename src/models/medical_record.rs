use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::appointment::{DoctorRef, PartyRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub visit_date: NaiveDate,
    pub diagnosis: String,
    pub symptoms: Option<String>,
    pub prescription: Option<String>,
    pub lab_tests: Option<String>,
    pub treatment_notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecordView {
    #[serde(flatten)]
    pub record: MedicalRecord,
    pub patient: PartyRef,
    pub doctor: DoctorRef,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedicalRecord {
    pub patient_id: Uuid,
    /// Defaults to the caller's own doctor profile when omitted.
    pub doctor_id: Option<Uuid>,
    pub visit_date: Option<NaiveDate>,
    pub diagnosis: String,
    pub symptoms: Option<String>,
    pub prescription: Option<String>,
    pub lab_tests: Option<String>,
    pub treatment_notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecordUpdate {
    pub visit_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub symptoms: Option<String>,
    pub prescription: Option<String>,
    pub lab_tests: Option<String>,
    pub treatment_notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
}
