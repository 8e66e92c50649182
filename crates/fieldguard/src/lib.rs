//! `fieldguard`: transparent field-level encryption for entity records.
//!
//! A [`FieldGuard`] holds the field registry, the key, and the decrypt-failure
//! policy. Wrapping a [`QueryEngine`] with it yields a [`FieldInterceptor`]
//! that encrypts registered fields on the way into storage and decrypts them
//! on the way out, without the calling code changing.
//!
//! ```ignore
//! let guard = FieldGuard::from_config(&Config::from_env()?)?;
//! let db = guard.wrap(my_engine);
//! db.create("Client", record).await?;
//! ```

pub mod config;
pub mod crypto;
pub mod diagnostics;
pub mod engine;
pub mod guard;
pub mod interceptor;
pub mod keys;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod transform;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use crypto::{AesFieldCipher, FieldCipher};
pub use diagnostics::{self_test, validate_loaded, validate_setup, SetupReport};
pub use engine::{Operation, QueryEngine, QueryOutput, Record};
pub use guard::FieldGuard;
pub use interceptor::{FieldInterceptor, InterceptError};
pub use registry::{FieldRegistry, SharedRegistry};
pub use transform::DecryptFailurePolicy;
