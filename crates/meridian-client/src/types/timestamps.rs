//! Timestamp bounds for single-use read-only transactions.
//!
//! A bound picks which version of the data a read observes: the latest
//! committed data (strong), data at an exact timestamp, or data no staler
//! than some duration. The server rejects conflicting combinations; the
//! client forwards whatever the caller set.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Read timestamp bound for a single-use read-only transaction.
///
/// `Option<TimestampBounds>` distinguishes "no options" (`None`) from "empty
/// options" (`Some(TimestampBounds::default())`). Reads issued with `None`
/// carry no transaction selector at all.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use meridian_client::types::TimestampBounds;
///
/// let bounds = TimestampBounds::new().exact_staleness(Duration::from_secs(10));
/// assert_eq!(bounds.exact_staleness, Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampBounds {
    /// Read the latest committed data.
    pub strong: Option<bool>,
    /// Read data at a timestamp no earlier than this.
    pub min_read_timestamp: Option<DateTime<Utc>>,
    /// Read data no staler than this.
    pub max_staleness: Option<Duration>,
    /// Read data at exactly this timestamp.
    pub read_timestamp: Option<DateTime<Utc>>,
    /// Read data exactly this stale.
    pub exact_staleness: Option<Duration>,
    /// Ask the server to report the timestamp it read at.
    pub return_read_timestamp: bool,
}

impl TimestampBounds {
    /// Creates an empty bound set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a strong read.
    pub fn strong(mut self) -> Self {
        self.strong = Some(true);
        self
    }

    /// Sets the minimum read timestamp.
    pub fn min_read_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.min_read_timestamp = Some(ts);
        self
    }

    /// Sets the maximum staleness.
    pub fn max_staleness(mut self, staleness: Duration) -> Self {
        self.max_staleness = Some(staleness);
        self
    }

    /// Sets the exact read timestamp.
    pub fn read_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.read_timestamp = Some(ts);
        self
    }

    /// Sets the exact staleness.
    pub fn exact_staleness(mut self, staleness: Duration) -> Self {
        self.exact_staleness = Some(staleness);
        self
    }

    /// Asks the server to return the read timestamp.
    pub fn return_read_timestamp(mut self, enabled: bool) -> Self {
        self.return_read_timestamp = enabled;
        self
    }
}
