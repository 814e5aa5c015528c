//! Endpoint handlers, one module per resource.

pub mod appointments;
pub mod auth;
pub mod bills;
pub mod doctors;
pub mod health;
pub mod inventory;
pub mod patients;
pub mod records;
pub mod users;
