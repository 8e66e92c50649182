//! [`FieldGuard`]: the assembled layer a host application builds once at
//! startup and uses to wrap its storage engine.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::crypto::{AesFieldCipher, FieldCipher};
use crate::diagnostics::{self, SetupReport};
use crate::engine::QueryEngine;
use crate::interceptor::FieldInterceptor;
use crate::keys::{self, KeyStore};
use crate::registry::{self, FieldRegistry, SharedRegistry};
use crate::transform::DecryptFailurePolicy;

/// Registry, key, cipher, and policy for one process.
pub struct FieldGuard {
    registry: SharedRegistry,
    cipher: Arc<AesFieldCipher>,
    policy: DecryptFailurePolicy,
}

impl FieldGuard {
    /// Build the layer from configuration.
    ///
    /// Startup sequence:
    /// 1. Seed the registry from `FIELD_MAP_PATH`, if set.
    /// 2. Run [`diagnostics::validate_setup`]; log warnings, fail on errors.
    /// 3. Load the key into a fresh [`KeyStore`].
    /// 4. Run [`diagnostics::self_test`]; fail if it does not pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the field map cannot be loaded, the setup is
    /// invalid, or the self-test fails. The process must not serve traffic
    /// in that case.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let registry = match &cfg.field_map_path {
            Some(path) => SharedRegistry::from_map(registry::load_file(path)?),
            None => SharedRegistry::new(),
        };

        let report = diagnostics::validate_setup(cfg.field_encryption_key.as_deref(), &registry);
        for warning in &report.warnings {
            warn!(warning = %warning, "setup warning");
        }
        if !report.valid {
            anyhow::bail!("invalid field encryption setup: {}", report.errors.join("; "));
        }

        let keys = KeyStore::new();
        keys::load_encoded(&keys, cfg.field_encryption_key.as_deref())
            .context("failed to load field encryption key")?;
        let cipher = Arc::new(AesFieldCipher::new(keys));

        if !diagnostics::self_test(cipher.as_ref()) {
            anyhow::bail!("field encryption self-test failed");
        }

        info!(
            entities = registry.len(),
            policy = cfg.decrypt_failure_policy.as_str(),
            "field encryption ready"
        );

        Ok(Self {
            registry,
            cipher,
            policy: cfg.decrypt_failure_policy,
        })
    }

    /// Assemble a guard from an existing registry and key store without
    /// running the startup checks. [`diagnose`](Self::diagnose) still reports
    /// on whatever `keys` holds.
    pub fn from_parts(
        registry: SharedRegistry,
        keys: KeyStore,
        policy: DecryptFailurePolicy,
    ) -> Self {
        Self {
            registry,
            cipher: Arc::new(AesFieldCipher::new(keys)),
            policy,
        }
    }

    /// Wrap `engine` so every operation goes through the interceptor.
    pub fn wrap<E: QueryEngine>(&self, engine: E) -> FieldInterceptor<E> {
        FieldInterceptor::new(
            engine,
            Arc::new(self.registry.clone()),
            self.cipher.clone(),
            self.policy,
        )
    }

    /// The shared registry; runtime changes apply to every wrapped engine.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn keys(&self) -> &KeyStore {
        self.cipher.keys()
    }

    pub fn cipher(&self) -> &dyn FieldCipher {
        self.cipher.as_ref()
    }

    pub fn policy(&self) -> DecryptFailurePolicy {
        self.policy
    }

    /// Setup findings for the loaded key and current registry, and a fresh
    /// self-test result.
    pub fn diagnose(&self) -> (SetupReport, bool) {
        let report = diagnostics::validate_loaded(self.keys(), &self.registry);
        let self_test = diagnostics::self_test(self.cipher.as_ref());
        (report, self_test)
    }

    /// Replace the key at runtime and re-run the self-test.
    ///
    /// # Errors
    ///
    /// Returns an error if the new key is malformed (the old key stays in
    /// place) or the self-test fails under the new key.
    pub fn rotate_key(&self, encoded: &str) -> Result<()> {
        keys::load_encoded(self.keys(), Some(encoded)).context("failed to rotate key")?;
        if !diagnostics::self_test(self.cipher.as_ref()) {
            anyhow::bail!("self-test failed after key rotation");
        }
        Ok(())
    }
}

impl fmt::Debug for FieldGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldGuard")
            .field("entities", &self.registry.list_all().len())
            .field("key_fingerprint", &self.keys().fingerprint())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
