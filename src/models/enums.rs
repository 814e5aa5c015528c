use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern,
/// plus SQLite column conversions so rows map straight into the enum.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

str_enum!(Role {
    Admin => "admin",
    Doctor => "doctor",
    Nurse => "nurse",
    Patient => "patient",
});

str_enum!(UserStatus {
    Active => "active",
    Inactive => "inactive",
});

str_enum!(Gender {
    Male => "male",
    Female => "female",
    Other => "other",
});

str_enum!(Availability {
    Available => "available",
    OnLeave => "on_leave",
    Busy => "busy",
});

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

impl AppointmentStatus {
    /// Statuses that hold a doctor's slot.
    pub const ACTIVE: [AppointmentStatus; 2] = [Self::Scheduled, Self::Confirmed];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

str_enum!(AppointmentType {
    Consultation => "consultation",
    FollowUp => "follow_up",
    Emergency => "emergency",
    Checkup => "checkup",
});

str_enum!(BillStatus {
    Pending => "pending",
    PartiallyPaid => "partially_paid",
    Paid => "paid",
    Overdue => "overdue",
});

str_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    Insurance => "insurance",
    Online => "online",
});

str_enum!(InventoryCategory {
    Medicine => "medicine",
    Equipment => "equipment",
    Supplies => "supplies",
    Consumables => "consumables",
});

str_enum!(StockStatus {
    InStock => "in_stock",
    LowStock => "low_stock",
    OutOfStock => "out_of_stock",
    Expired => "expired",
});
