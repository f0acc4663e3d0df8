//! Composition configuration

use crate::delta::DEFAULT_TOP_K_RATIO;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Per-request composition settings
///
/// Loaded from TOML; missing fields take their defaults.
///
/// ```toml
/// enabled = true
/// cfg_rescale = 0.7
/// verbose = false
/// top_k_ratio = 0.05
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeutralPromptConfig {
    /// Compose prompts; when false every hook passes through
    pub enabled: bool,
    /// Variance-preserving rescale factor in `[0, 1]`
    pub cfg_rescale: f32,
    /// Log diagnostics as they are recorded
    pub verbose: bool,
    /// Fraction of elements kept by semantic guidance, in `[0, 1]`
    pub top_k_ratio: f32,
}

impl NeutralPromptConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from TOML text and validate
    ///
    /// # Errors
    /// Returns [`ConfigError`] for malformed TOML or out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::OutOfRange`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("cfg_rescale", self.cfg_rescale)?;
        check_unit("top_k_ratio", self.top_k_ratio)
    }

    /// With enabled flag
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// With rescale factor
    #[inline]
    #[must_use]
    pub fn with_cfg_rescale(mut self, cfg_rescale: f32) -> Self {
        self.cfg_rescale = cfg_rescale;
        self
    }

    /// With verbose flag
    #[inline]
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// With semantic guidance ratio
    #[inline]
    #[must_use]
    pub fn with_top_k_ratio(mut self, top_k_ratio: f32) -> Self {
        self.top_k_ratio = top_k_ratio;
        self
    }
}

impl Default for NeutralPromptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cfg_rescale: 0.0,
            verbose: true,
            #[allow(clippy::cast_possible_truncation)]
            top_k_ratio: DEFAULT_TOP_K_RATIO as f32,
        }
    }
}

pub(crate) fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = NeutralPromptConfig::default();
        assert!(config.enabled);
        assert!(config.verbose);
        assert_eq!(config.cfg_rescale, 0.0);
        assert!((config.top_k_ratio - 0.05).abs() < 1e-7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_partial_toml() {
        let config = NeutralPromptConfig::from_toml_str("cfg_rescale = 0.7\nverbose = false").unwrap();
        assert_eq!(
            config,
            NeutralPromptConfig::new()
                .with_cfg_rescale(0.7)
                .with_verbose(false)
        );
    }

    #[test]
    fn reject_out_of_range() {
        let err = NeutralPromptConfig::from_toml_str("cfg_rescale = 1.5").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "cfg_rescale",
                ..
            }
        ));

        let config = NeutralPromptConfig::new().with_top_k_ratio(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_malformed_toml() {
        let err = NeutralPromptConfig::from_toml_str("enabled = maybe").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn nan_is_out_of_range() {
        assert!(NeutralPromptConfig::new()
            .with_cfg_rescale(f32::NAN)
            .validate()
            .is_err());
    }
}
