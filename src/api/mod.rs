//! JSON REST API.
//!
//! Resources are nested under `/api/`. Protected routes pass through the
//! bearer-JWT auth layer; every request is access-logged.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod test_harness;

pub use router::api_router;
pub use server::{serve, start_api_server_on, ApiServer, ServerError, ServerInfo};
pub use types::ApiContext;
