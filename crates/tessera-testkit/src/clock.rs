//! Controllable wall clock

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tessera_core::effects::{PhysicalTimeEffects, TimeError};
use tessera_core::PhysicalTime;

/// A clock that only moves when told to
///
/// Shared by every node of a [`crate::MockNetwork`], so all nodes agree on
/// the time.
#[derive(Debug, Default)]
pub struct ControllableClock {
    now_ms: AtomicU64,
}

impl ControllableClock {
    /// Clock frozen at `start`
    pub fn new(start: PhysicalTime) -> Self {
        Self {
            now_ms: AtomicU64::new(start.ts_ms),
        }
    }

    /// Current reading
    pub fn now(&self) -> PhysicalTime {
        PhysicalTime::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    /// Jump to `time`
    pub fn set(&self, time: PhysicalTime) {
        self.now_ms.store(time.ts_ms, Ordering::SeqCst);
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

#[async_trait]
impl PhysicalTimeEffects for ControllableClock {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clock_moves_only_when_told() {
        let clock = ControllableClock::new(PhysicalTime::from_millis(1_000));
        assert_eq!(clock.physical_time().await.unwrap().ts_ms, 1_000);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now().ts_ms, 3_000);

        clock.set(PhysicalTime::from_millis(10));
        assert_eq!(clock.physical_time().await.unwrap().ts_ms, 10);
    }
}
