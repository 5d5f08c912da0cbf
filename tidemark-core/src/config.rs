//! Configuration types

use crate::{ConfigError, COMMENT_ELLIPSIS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for transient catalog and storage failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Upper bound for a single sleep
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Total time budget across all attempts of one call
    pub max_elapsed_ms: u64,
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    /// Sleep before retry number `retry` (1-based), capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exp);
        let capped = millis.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            max_elapsed_ms: 60_000,
        }
    }
}

/// Engine configuration.
///
/// Everything that used to be process-wide lives here and is handed to the
/// table descriptor at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Database for `DataCategory::Logs` tables
    pub logs_database: String,
    /// Database for `DataCategory::RuleMatches` tables
    pub rule_matches_database: String,
    /// Bit width used when mapping platform-native integers (32 or 64)
    pub native_int_width: u32,
    /// Maximum column comment length accepted by the catalog
    pub max_comment_length: usize,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logs_database: "lake_logs".to_string(),
            rule_matches_database: "lake_rule_matches".to_string(),
            native_int_width: 64,
            max_comment_length: 255,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document and validate it. Missing keys take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - database names are non-empty
    /// - native_int_width is 32 or 64
    /// - max_comment_length leaves room for the ellipsis
    /// - backoff values are positive and the multiplier is at least 1.0
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("logs_database", &self.logs_database),
            ("rule_matches_database", &self.rule_matches_database),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                    reason: "database name must not be empty".to_string(),
                });
            }
        }

        if !matches!(self.native_int_width, 32 | 64) {
            return Err(ConfigError::InvalidValue {
                field: "native_int_width".to_string(),
                value: self.native_int_width.to_string(),
                reason: "only 32 and 64 bit native integers are supported".to_string(),
            });
        }

        if self.max_comment_length <= COMMENT_ELLIPSIS.len() {
            return Err(ConfigError::InvalidValue {
                field: "max_comment_length".to_string(),
                value: self.max_comment_length.to_string(),
                reason: format!("must be greater than {}", COMMENT_ELLIPSIS.len()),
            });
        }

        let retry = &self.retry;
        if retry.initial_backoff_ms == 0 || retry.max_backoff_ms < retry.initial_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.initial_backoff_ms".to_string(),
                value: retry.initial_backoff_ms.to_string(),
                reason: "must be positive and not exceed max_backoff_ms".to_string(),
            });
        }
        if retry.backoff_multiplier < 1.0 || !retry.backoff_multiplier.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "retry.backoff_multiplier".to_string(),
                value: retry.backoff_multiplier.to_string(),
                reason: "must be a finite value of at least 1.0".to_string(),
            });
        }
        if retry.max_elapsed_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_elapsed_ms".to_string(),
                value: retry.max_elapsed_ms.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_toml_partial_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            logs_database = "my_logs"
            native_int_width = 32

            [retry]
            max_retries = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.logs_database, "my_logs");
        assert_eq!(config.rule_matches_database, "lake_rule_matches");
        assert_eq!(config.native_int_width, 32);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn test_from_toml_rejects_native_width() {
        let err = EngineConfig::from_toml_str("native_int_width = 16").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "native_int_width"));
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = EngineConfig::from_toml_str("native_int_width = \"wide\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_database() {
        let config = EngineConfig {
            rule_matches_database: "  ".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_small_multiplier() {
        let mut config = EngineConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
            backoff_multiplier: 2.0,
            ..RetryConfig::default()
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(400));
        assert_eq!(retry.backoff_for(4), Duration::from_millis(500));
        assert_eq!(retry.backoff_for(30), Duration::from_millis(500));
        assert_eq!(retry.backoff_for(u32::MAX), Duration::from_millis(500));
    }
}
