//! Limits shared by the router's middleware stack.
//!
//! The layers themselves are attached in [`router::build`](super::router::build).

use std::time::Duration;

/// Upper bound on a single admin request, enforced by `TimeoutLayer`.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
