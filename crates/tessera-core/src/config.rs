//! Configuration loading
//!
//! Configuration sections are plain serde structs with `Default` values. They
//! are read from TOML and validated before use; missing keys fall back to the
//! defaults through `#[serde(default)]` on the implementing type.

use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

use crate::{Result, TesseraError};

/// Core trait for Tessera configuration types
pub trait TesseraConfig: Clone + Default + DeserializeOwned + Send + Sync + 'static {
    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Parse and validate from a TOML string
    fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| TesseraError::invalid(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::storage(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        timeout_ms: u64,
        label: String,
    }

    impl Default for SampleConfig {
        fn default() -> Self {
            Self {
                timeout_ms: 500,
                label: "sample".to_string(),
            }
        }
    }

    impl TesseraConfig for SampleConfig {
        fn validate(&self) -> Result<()> {
            if self.timeout_ms == 0 {
                return Err(TesseraError::invalid("timeout_ms must be > 0"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SampleConfig::from_toml_str("timeout_ms = 42").unwrap();
        assert_eq!(config.timeout_ms, 42);
        assert_eq!(config.label, "sample");
    }

    #[test]
    fn test_validation_runs_on_load() {
        assert!(SampleConfig::from_toml_str("timeout_ms = 0").is_err());
        assert!(SampleConfig::from_toml_str("timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "label = \"from-file\"").unwrap();
        let config = SampleConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.label, "from-file");

        assert!(SampleConfig::load_from_file(Path::new("/nonexistent/tessera.toml")).is_err());
    }
}
