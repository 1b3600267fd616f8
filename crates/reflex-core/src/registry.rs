//! Tenant registry.
//!
//! An explicit mapping from namespace to cascade configuration, constructed
//! and owned by the host process and passed by handle. Tenants without an
//! override share the default handle, so reloading the default reconfigures
//! every non-overridden tenant at once.

use dashmap::DashMap;

use crate::config::{CascadeConfig, ConfigHandle};

/// Namespace → configuration registry.
pub struct CascadeRegistry {
    default: ConfigHandle,
    tenants: DashMap<String, ConfigHandle>,
}

impl CascadeRegistry {
    /// Create a registry with the given default configuration.
    pub fn new(default: CascadeConfig) -> Self {
        Self {
            default: ConfigHandle::new(default),
            tenants: DashMap::new(),
        }
    }

    /// Snapshot the effective config for a namespace.
    pub fn config(&self, namespace: &str) -> CascadeConfig {
        match self.tenants.get(namespace) {
            Some(handle) => handle.snapshot(),
            None => self.default.snapshot(),
        }
    }

    /// The reloadable handle for a namespace (the default handle when the
    /// tenant has no override).
    pub fn handle(&self, namespace: &str) -> ConfigHandle {
        self.tenants
            .get(namespace)
            .map(|h| h.value().clone())
            .unwrap_or_else(|| self.default.clone())
    }

    /// Install or replace a tenant-specific configuration.
    pub fn set_tenant(&self, namespace: impl Into<String>, config: CascadeConfig) {
        let namespace = namespace.into();
        match self.tenants.get(&namespace) {
            Some(handle) => handle.replace(config),
            None => {
                self.tenants.insert(namespace, ConfigHandle::new(config));
            }
        }
    }

    /// Drop a tenant override; the tenant falls back to the default.
    pub fn remove_tenant(&self, namespace: &str) {
        self.tenants.remove(namespace);
    }

    /// Hot-reload the default configuration.
    pub fn reload_default(&self, config: CascadeConfig) {
        self.default.replace(config);
    }
}

impl Default for CascadeRegistry {
    fn default() -> Self {
        Self::new(CascadeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_shared() {
        let registry = CascadeRegistry::default();
        assert!(registry.config("anyone").enabled);

        let mut disabled = registry.config("anyone");
        disabled.enabled = false;
        registry.reload_default(disabled);

        assert!(!registry.config("anyone").enabled);
        assert!(!registry.config("someone-else").enabled);
    }

    #[test]
    fn test_tenant_override_isolated() {
        let registry = CascadeRegistry::default();
        let mut strict = CascadeConfig::default();
        strict.fuzzy_threshold = 0.95;
        registry.set_tenant("tenant-a", strict);

        assert!((registry.config("tenant-a").fuzzy_threshold - 0.95).abs() < f32::EPSILON);
        assert!((registry.config("tenant-b").fuzzy_threshold - 0.80).abs() < f32::EPSILON);
    }

    #[test]
    fn test_remove_tenant_falls_back() {
        let registry = CascadeRegistry::default();
        let mut strict = CascadeConfig::default();
        strict.enabled = false;
        registry.set_tenant("tenant-a", strict);
        assert!(!registry.config("tenant-a").enabled);

        registry.remove_tenant("tenant-a");
        assert!(registry.config("tenant-a").enabled);
    }
}
