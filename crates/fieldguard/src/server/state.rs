//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::guard::FieldGuard;

/// Application state shared across all request handlers.
///
/// Cloning is an `Arc` bump; the registry inside the guard is shared with
/// every engine the host application has wrapped.
#[derive(Clone, Debug)]
pub struct AppState {
    pub guard: Arc<FieldGuard>,
}

impl AppState {
    pub fn new(guard: Arc<FieldGuard>) -> Self {
        Self { guard }
    }
}
