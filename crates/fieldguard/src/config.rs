//! Configuration loading and validation.
//!
//! All values are read from environment variables at startup. The encryption
//! key is optional at this stage so that a missing or malformed key is
//! reported through [`validate_setup`](crate::diagnostics::validate_setup)
//! together with every other finding.

use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::transform::DecryptFailurePolicy;

/// Validated fieldguard configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Standard base64 of the 32-byte field encryption key.
    #[serde(default)]
    pub field_encryption_key: Option<String>,

    /// YAML or JSON file seeding the field registry.
    #[serde(default)]
    pub field_map_path: Option<String>,

    /// What reads return for a field that fails to decrypt.
    #[serde(default)]
    pub decrypt_failure_policy: DecryptFailurePolicy,

    /// Port of the diagnostics / registry admin server.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// OTLP endpoint for trace export. Logs only when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field(
                "field_encryption_key",
                &self.field_encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("field_map_path", &self.field_map_path)
            .field("decrypt_failure_policy", &self.decrypt_failure_policy)
            .field("listen_port", &self.listen_port)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Drop the encoded key once it has been loaded, overwriting its bytes.
    pub fn discard_key(&mut self) {
        if let Some(encoded) = self.field_encryption_key.take() {
            let mut bytes = encoded.into_bytes();
            bytes.iter_mut().for_each(|b| *b = 0);
        }
    }

    /// Validate field shapes, returning a descriptive error on the first failure.
    ///
    /// Key checks are left to `validate_setup`.
    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.field_map_path {
            ensure_non_empty(path, "FIELD_MAP_PATH")?;
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be a non-zero port");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty when set");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        field_encryption_key: None,
        field_map_path: None,
        decrypt_failure_policy: DecryptFailurePolicy::default(),
        listen_port: default_listen_port(),
        otel_exporter_otlp_endpoint: None,
        log_level: default_log_level(),
    }
}
