//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Audit logger: one line per request, including rejected ones
//! 2. Auth validator: bearer JWT, injects `AuthUser` (protected routes only)

pub mod audit;
pub mod auth;
