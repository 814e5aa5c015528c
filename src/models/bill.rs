use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::appointment::PartyRef;
use super::enums::{BillStatus, PaymentMethod};
use super::money::Money;
use super::patch;

/// One billed line: `quantity` units at `price` each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLine {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub price: Money,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub invoice_number: String,
    pub services: Vec<ServiceLine>,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub balance_amount: Money,
    pub status: BillStatus,
    pub bill_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillView {
    #[serde(flatten)]
    pub bill: Bill,
    pub patient: PartyRef,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    pub patient_id: Uuid,
    pub services: Vec<ServiceLine>,
    pub bill_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillUpdate {
    pub services: Option<Vec<ServiceLine>>,
    pub status: Option<BillStatus>,
    #[serde(default, deserialize_with = "patch::nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default, deserialize_with = "patch::nullable")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: Money,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillStats {
    pub total_revenue: Money,
    pub pending_amount: Money,
    pub total_bills: i64,
    pub paid_bills: i64,
    pub pending_bills: i64,
    pub overdue_bills: i64,
}
