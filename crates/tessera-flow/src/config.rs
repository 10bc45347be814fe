//! Flow runtime configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_core::{Result, TesseraConfig, TesseraError};

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRuntimeConfig {
    /// Receive timeout used by flows that do not pass their own
    pub default_receive_timeout_ms: u64,
    /// Write checkpoints at suspension points
    pub checkpointing: bool,
}

impl Default for FlowRuntimeConfig {
    fn default() -> Self {
        Self {
            default_receive_timeout_ms: 30_000,
            checkpointing: true,
        }
    }
}

impl FlowRuntimeConfig {
    /// Default receive timeout as a duration
    pub fn default_receive_timeout(&self) -> Duration {
        Duration::from_millis(self.default_receive_timeout_ms)
    }
}

impl TesseraConfig for FlowRuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.default_receive_timeout_ms == 0 {
            return Err(TesseraError::invalid(
                "default_receive_timeout_ms must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_validation() {
        let config = FlowRuntimeConfig::from_toml_str("checkpointing = false").unwrap();
        assert!(!config.checkpointing);
        assert_eq!(config.default_receive_timeout_ms, 30_000);
        assert!(FlowRuntimeConfig::from_toml_str("default_receive_timeout_ms = 0").is_err());
    }
}
