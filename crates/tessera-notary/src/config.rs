//! Notary service configuration

use serde::{Deserialize, Serialize};
use tessera_core::{Result, TesseraConfig, TesseraError};
use tessera_flow::NotaryKind;

/// Notary service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotaryConfig {
    /// Whether transactions are re-verified before commit
    pub mode: NotaryKind,
    /// Allowed clock drift when checking time windows
    pub time_tolerance_ms: u64,
    /// Lock shards in the uniqueness store
    pub uniqueness_shards: usize,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            mode: NotaryKind::NonValidating,
            time_tolerance_ms: 30_000,
            uniqueness_shards: 16,
        }
    }
}

impl NotaryConfig {
    /// Default settings for a validating notary
    pub fn validating() -> Self {
        Self {
            mode: NotaryKind::Validating,
            ..Self::default()
        }
    }
}

impl TesseraConfig for NotaryConfig {
    fn validate(&self) -> Result<()> {
        if self.uniqueness_shards == 0 {
            return Err(TesseraError::invalid("uniqueness_shards must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validating_mode() {
        let config = NotaryConfig::from_toml_str(
            r#"
            mode = "validating"
            time_tolerance_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, NotaryKind::Validating);
        assert_eq!(config.time_tolerance_ms, 500);
        assert_eq!(config.uniqueness_shards, 16);
    }

    #[test]
    fn test_zero_shards_rejected() {
        assert!(NotaryConfig::from_toml_str("uniqueness_shards = 0").is_err());
        assert!(NotaryConfig::default().validate().is_ok());
    }
}
