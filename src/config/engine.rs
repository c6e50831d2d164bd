//! Engine configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Disposer engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisposerConfig {
    /// Maximum disposal attempts in flight across the whole backlog. Bounds
    /// pressure on external systems, e.g. simultaneous deletions against a
    /// rate-limited API.
    pub max_in_flight: usize,
    /// Seconds between sweeps re-submitting every unresolved item.
    pub sweep_interval_secs: u64,
    /// Age in seconds after which an unresolved item marks the backlog
    /// stale. Zero means any unresolved item is immediately stale.
    pub stale_after_secs: u64,
}

impl Default for DisposerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            sweep_interval_secs: 60,
            stale_after_secs: 4 * 60 * 60,
        }
    }
}

impl DisposerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// A human-readable description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_in_flight == 0 {
            return Err("max_in_flight must be greater than 0".into());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// A human-readable parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Sweep period as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = DisposerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_in_flight, 10);
        assert_eq!(cfg.sweep_interval_secs, 60);
        assert_eq!(cfg.stale_after_secs, 14_400);
    }

    #[test]
    fn zero_in_flight_is_rejected() {
        let cfg = DisposerConfig {
            max_in_flight: 0,
            ..DisposerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let cfg = DisposerConfig {
            sweep_interval_secs: 0,
            ..DisposerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let cfg = DisposerConfig::from_json_str(r#"{ "max_in_flight": 3 }"#).unwrap();
        assert_eq!(cfg.max_in_flight, 3);
        assert_eq!(cfg.sweep_interval_secs, 60);

        assert!(DisposerConfig::from_json_str(r#"{ "max_in_flight": 0 }"#).is_err());
        assert!(DisposerConfig::from_json_str("not json").is_err());
    }
}
