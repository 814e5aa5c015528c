use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{InventoryCategory, StockStatus};
use super::money::Money;
use super::patch;

pub const DEFAULT_MIN_QUANTITY: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    pub item_name: String,
    pub category: InventoryCategory,
    pub quantity: i64,
    pub min_quantity: i64,
    pub unit_price: Money,
    pub supplier: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub description: Option<String>,
    pub status: StockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInventoryItem {
    pub item_name: String,
    pub category: InventoryCategory,
    #[serde(default)]
    pub quantity: i64,
    pub min_quantity: Option<i64>,
    #[serde(default)]
    pub unit_price: Money,
    pub supplier: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryUpdate {
    pub item_name: Option<String>,
    pub category: Option<InventoryCategory>,
    pub quantity: Option<i64>,
    pub min_quantity: Option<i64>,
    pub unit_price: Option<Money>,
    #[serde(default, deserialize_with = "patch::nullable")]
    pub supplier: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch::nullable")]
    pub expiry_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "patch::nullable")]
    pub batch_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "patch::nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub total_items: i64,
    pub low_stock_items: i64,
    pub out_of_stock_items: i64,
    pub expired_items: i64,
    /// Stock value (quantity times unit price) of non-expired items.
    pub total_value: Money,
    pub category_count: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: InventoryCategory,
    pub count: i64,
}
