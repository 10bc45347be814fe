//! System clock handler

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tessera_core::effects::{PhysicalTimeEffects, TimeError};
use tessera_core::PhysicalTime;

/// Reads wall-clock time from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeHandler;

impl RealTimeHandler {
    /// Create a handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for RealTimeHandler {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let ts_ms = u64::try_from(since_epoch.as_millis()).map_err(|_| {
            TimeError::ServiceUnavailable {
                reason: "system clock out of range".to_string(),
            }
        })?;
        Ok(PhysicalTime::from_millis(ts_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_time_is_after_2020() {
        let now = RealTimeHandler::new().physical_time().await.unwrap();
        assert!(now.ts_ms > 1_577_836_800_000);
    }
}
