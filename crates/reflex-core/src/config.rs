//! Configuration for the decision cascade.
//!
//! One `CascadeConfig` per tenant (or a shared default), held behind a
//! [`ConfigHandle`] so the host can hot-reload thresholds and the emergency
//! disable switch without restarting. There is no environment-variable
//! toggle: `enabled` is the only off switch.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ReflexError, ReflexResult};

/// Token-bucket rate limiter settings, per (namespace, session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Burst capacity in requests.
    #[serde(default = "default_rate_capacity")]
    pub capacity: u32,
    /// Sustained refill rate in requests per second.
    #[serde(default = "default_rate_refill")]
    pub refill_per_sec: f64,
}

fn default_rate_capacity() -> u32 {
    10
}

fn default_rate_refill() -> f64 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_capacity(),
            refill_per_sec: default_rate_refill(),
        }
    }
}

/// Percentage rollout with explicit allow/deny lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Share of sessions participating, in [0, 100].
    #[serde(default = "default_rollout_percentage")]
    pub percentage: u8,
    /// Tenants always included, regardless of percentage.
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Tenants always excluded. Wins over the allowlist.
    #[serde(default)]
    pub denylist: Vec<String>,
}

fn default_rollout_percentage() -> u8 {
    100
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            percentage: default_rollout_percentage(),
            allowlist: Vec::new(),
            denylist: Vec::new(),
        }
    }
}

/// Cascade configuration. Static per deployment, reloadable via
/// [`ConfigHandle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Master switch. When false every request routes straight to the
    /// fallback provider with method `disabled`.
    pub enabled: bool,
    /// Stage 1a fuzzy-acceptance threshold in [0, 1].
    pub fuzzy_threshold: f32,
    /// Stage 1b semantic-acceptance threshold in [0, 1].
    pub semantic_threshold: f32,
    /// Minimum fallback confidence required to learn a new pattern.
    pub learning_confidence_threshold: f32,
    /// Utterances shorter than this (in characters) are rejected.
    pub min_utterance_length: usize,
    /// Utterances longer than this (in characters) are rejected.
    pub max_utterance_length: usize,
    /// Case-insensitive substrings that reject an utterance outright.
    pub blocklist: Vec<String>,
    /// Per-session rate limiting.
    pub rate_limit: RateLimitConfig,
    /// Rollout gating.
    pub rollout: RolloutConfig,
    /// Patterns whose success rate drops below this floor are deactivated.
    pub deactivation_success_floor: f32,
    /// Minimum feedback observations before the floor applies.
    pub deactivation_min_samples: u64,
    /// Stage 1b embedding call budget in milliseconds.
    pub embed_timeout_ms: u64,
    /// Estimated cost of one fallback invocation, for telemetry cost deltas.
    pub fallback_cost_estimate: f32,
    /// Estimated cost of one embedding call, for telemetry cost deltas.
    pub embedding_cost_estimate: f32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fuzzy_threshold: 0.80,
            semantic_threshold: 0.75,
            learning_confidence_threshold: 0.90,
            min_utterance_length: 2,
            max_utterance_length: 500,
            blocklist: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            rollout: RolloutConfig::default(),
            deactivation_success_floor: 0.5,
            deactivation_min_samples: 5,
            embed_timeout_ms: 250,
            fallback_cost_estimate: 0.01,
            embedding_cost_estimate: 0.0001,
        }
    }
}

impl CascadeConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ReflexResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ReflexError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ReflexError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| ReflexError::Configuration(e.to_string()))?,
            _ => {
                return Err(ReflexError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check threshold and bound sanity.
    pub fn validate(&self) -> ReflexResult<()> {
        for (name, value) in [
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("semantic_threshold", self.semantic_threshold),
            (
                "learning_confidence_threshold",
                self.learning_confidence_threshold,
            ),
            (
                "deactivation_success_floor",
                self.deactivation_success_floor,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReflexError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.rollout.percentage > 100 {
            return Err(ReflexError::Configuration(format!(
                "rollout.percentage must be within [0, 100], got {}",
                self.rollout.percentage
            )));
        }
        if self.min_utterance_length > self.max_utterance_length {
            return Err(ReflexError::Configuration(
                "min_utterance_length exceeds max_utterance_length".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared, hot-reloadable view of a [`CascadeConfig`].
///
/// Readers take a cheap snapshot per request; `replace` swaps the whole
/// config atomically so a request never observes a half-applied reload.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<CascadeConfig>>,
}

impl ConfigHandle {
    /// Wrap a config for shared access.
    pub fn new(config: CascadeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Snapshot the current config.
    pub fn snapshot(&self) -> CascadeConfig {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the config wholesale (hot reload).
    pub fn replace(&self, config: CascadeConfig) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(CascadeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        CascadeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_threshold_bounds_rejected() {
        let cfg = CascadeConfig {
            fuzzy_threshold: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_length_bounds_rejected() {
        let cfg = CascadeConfig {
            min_utterance_length: 100,
            max_utterance_length: 10,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cascade.toml");
        std::fs::write(
            &path,
            "enabled = false\nfuzzy_threshold = 0.85\nblocklist = [\"refund\"]\n",
        )
        .unwrap();

        let cfg = CascadeConfig::from_file(&path).unwrap();
        assert!(!cfg.enabled);
        assert!((cfg.fuzzy_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(cfg.blocklist, vec!["refund".to_string()]);
        // Unspecified fields keep their defaults.
        assert!((cfg.semantic_threshold - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_handle_hot_reload() {
        let handle = ConfigHandle::default();
        assert!(handle.snapshot().enabled);

        let mut updated = handle.snapshot();
        updated.enabled = false;
        handle.replace(updated);

        assert!(!handle.snapshot().enabled);
    }
}
