//! Wall-clock timestamps and transaction time windows

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, TesseraError};

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicalTime {
    /// Unix time in milliseconds
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Create from Unix milliseconds
    pub fn from_millis(ts_ms: u64) -> Self {
        Self { ts_ms }
    }
}

impl fmt::Display for PhysicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ts_ms)
    }
}

/// Interval during which a transaction may be notarised
///
/// At least one bound is present; when both are, `from < until`. The lower
/// bound is inclusive and the upper bound exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeWindowSerde")]
pub struct TimeWindow {
    from: Option<PhysicalTime>,
    until: Option<PhysicalTime>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct TimeWindowSerde {
    from: Option<PhysicalTime>,
    until: Option<PhysicalTime>,
}

impl TryFrom<TimeWindowSerde> for TimeWindow {
    type Error = TesseraError;

    fn try_from(value: TimeWindowSerde) -> std::result::Result<Self, Self::Error> {
        Self::new(value.from, value.until)
    }
}

impl TimeWindow {
    /// Create a window from optional bounds
    pub fn new(from: Option<PhysicalTime>, until: Option<PhysicalTime>) -> Result<Self> {
        match (from, until) {
            (None, None) => Err(TesseraError::invalid(
                "time window needs at least one bound",
            )),
            (Some(f), Some(u)) if f >= u => Err(TesseraError::invalid(format!(
                "time window start {f} is not before end {u}"
            ))),
            _ => Ok(Self { from, until }),
        }
    }

    /// Window with both bounds
    pub fn between(from: PhysicalTime, until: PhysicalTime) -> Result<Self> {
        Self::new(Some(from), Some(until))
    }

    /// Window open on the right
    pub fn from_only(from: PhysicalTime) -> Self {
        Self {
            from: Some(from),
            until: None,
        }
    }

    /// Window open on the left
    pub fn until_only(until: PhysicalTime) -> Self {
        Self {
            from: None,
            until: Some(until),
        }
    }

    /// Inclusive lower bound
    pub fn from_time(&self) -> Option<PhysicalTime> {
        self.from
    }

    /// Exclusive upper bound
    pub fn until_time(&self) -> Option<PhysicalTime> {
        self.until
    }

    /// Whether `now` falls in the window widened by `tolerance_ms` on each side
    pub fn contains_with_tolerance(&self, now: PhysicalTime, tolerance_ms: u64) -> bool {
        let after_start = self
            .from
            .map_or(true, |f| now.ts_ms.saturating_add(tolerance_ms) >= f.ts_ms);
        let before_end = self
            .until
            .map_or(true, |u| now.ts_ms < u.ts_ms.saturating_add(tolerance_ms));
        after_start && before_end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from, self.until) {
            (Some(a), Some(b)) => write!(f, "[{a}, {b})"),
            (Some(a), None) => write!(f, "[{a}, ..)"),
            (None, Some(b)) => write!(f, "(.., {b})"),
            (None, None) => write!(f, "(..)"),
        }
    }
}
