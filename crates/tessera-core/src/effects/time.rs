//! Physical time effects
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `tessera-effects` (system clock), `tessera-testkit` (controllable clock)
//! - **Usage**: notary time-window checks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::time::PhysicalTime;

/// Error type for time operations.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum TimeError {
    /// Clock could not be read
    #[error("Time service unavailable: {reason}")]
    ServiceUnavailable {
        /// Why the clock is unavailable
        reason: String,
    },
}

/// Wall-clock access
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current wall-clock time
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError>;
}

#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for Arc<T> {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        (**self).physical_time().await
    }
}
