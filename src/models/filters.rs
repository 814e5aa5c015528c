use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::enums::{
    AppointmentStatus, BillStatus, InventoryCategory, Role, StockStatus, UserStatus,
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request, clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }

    pub fn pagination(&self, total: i64) -> Pagination {
        let limit = i64::from(self.limit);
        Pagination {
            total,
            page: self.page,
            pages: (total + limit - 1) / limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub pages: i64,
}

/// Row-level restriction applied to clinical queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Default)]
pub struct PatientFilter {
    pub search: Option<String>,
}

#[derive(Debug, Default)]
pub struct DoctorFilter {
    pub search: Option<String>,
    pub specialization: Option<String>,
}

#[derive(Debug, Default)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub scope: Scope,
}

#[derive(Debug, Default)]
pub struct MedicalRecordFilter {
    pub scope: Scope,
}

#[derive(Debug, Default)]
pub struct BillFilter {
    pub status: Option<BillStatus>,
    pub scope: Scope,
}

#[derive(Debug, Default)]
pub struct InventoryFilter {
    pub category: Option<InventoryCategory>,
    pub status: Option<StockStatus>,
    pub search: Option<String>,
}
