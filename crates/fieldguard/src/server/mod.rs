//! Axum admin server: health diagnostics and runtime registry changes.
//!
//! # Responsibilities
//! - Report `validate_setup` and `self_test` results on `/health`.
//! - Expose the field registry for listing and runtime registration.
//! - Inject the shared [`FieldGuard`](crate::guard::FieldGuard) into handlers.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
