use serde::Deserialize;

use crate::error::ImportError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine configuration. Every section defaults, so an empty TOML document
/// is a valid config.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Domain for synthesized placeholder emails.
    #[serde(default = "default_placeholder_domain")]
    pub placeholder_domain: String,
    /// How aggressively person names fall back to first-token matching.
    #[serde(default)]
    pub first_name_fallback: FallbackStrictness,
    /// Concurrent row batch width within the reconciliation phase.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
}

fn default_placeholder_domain() -> String {
    "import.invalid".to_string()
}

fn default_batch_size() -> usize {
    5
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            placeholder_domain: default_placeholder_domain(),
            first_name_fallback: FallbackStrictness::default(),
            batch_size: default_batch_size(),
            retry: RetryConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl ImportConfig {
    pub fn from_toml(text: &str) -> Result<Self, ImportError> {
        let config: ImportConfig =
            toml::from_str(text).map_err(|e| ImportError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.batch_size == 0 {
            return Err(ImportError::Config("batch_size must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ImportError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// First-name fallback
// ---------------------------------------------------------------------------

/// Source data is inconsistent about full names; the first-token fallback
/// can misattribute responsibility on near-duplicate names, so it is
/// configurable rather than hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrictness {
    /// Exact normalized full name only.
    Off,
    /// First token resolves only when exactly one known person shares it.
    UniqueOnly,
}

impl Default for FallbackStrictness {
    fn default() -> Self {
        Self::UniqueOnly
    }
}

// ---------------------------------------------------------------------------
// Retry + Verify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts per remote write, transient failures only.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff grows with attempt count from this base, bounded.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Fixed pause between independent row operations, even on success.
    /// Respects external rate limits proactively.
    #[serde(default = "default_pause_between_rows_ms")]
    pub pause_between_rows_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_pause_between_rows_ms() -> u64 {
    150
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            pause_between_rows_ms: default_pause_between_rows_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    /// Disable under strongly consistent stores; the phase degenerates to
    /// a no-op.
    #[serde(default = "default_verify_enabled")]
    pub enabled: bool,
    /// Settle delay before re-reading persisted state, letting replicas
    /// catch up with recent writes.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_verify_enabled() -> bool {
    true
}

fn default_settle_delay_ms() -> u64 {
    2000
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            enabled: default_verify_enabled(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ImportConfig::from_toml("").unwrap();
        assert_eq!(config.placeholder_domain, "import.invalid");
        assert_eq!(config.first_name_fallback, FallbackStrictness::UniqueOnly);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.verify.enabled);
        assert_eq!(config.verify.settle_delay_ms, 2000);
    }

    #[test]
    fn partial_override() {
        let toml = r#"
placeholder_domain = "escritorio.example"
first_name_fallback = "off"

[retry]
max_attempts = 5

[verify]
enabled = false
"#;
        let config = ImportConfig::from_toml(toml).unwrap();
        assert_eq!(config.placeholder_domain, "escritorio.example");
        assert_eq!(config.first_name_fallback, FallbackStrictness::Off);
        assert_eq!(config.retry.max_attempts, 5);
        // Unset retry fields keep defaults
        assert_eq!(config.retry.base_delay_ms, 500);
        assert!(!config.verify.enabled);
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = ImportConfig::from_toml("batch_size = 0").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = ImportConfig::from_toml("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }
}
