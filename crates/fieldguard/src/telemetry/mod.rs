//! Tracing setup: structured JSON logs, plus OTLP trace export when an
//! endpoint is configured.
//!
//! # Telemetry invariants
//!
//! - **No plaintext, ciphertext, or key material** in any span attribute or
//!   log field. Events name the entity, field, operation, and outcome only;
//!   keys are identified by fingerprint.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;

pub use init::init_telemetry;
