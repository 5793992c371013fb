/*
    types.rs - Common value types for the chat model

    Defines:
    - Timestamp (milliseconds since the Unix epoch)
*/

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Unix timestamp in milliseconds, as stored in message records
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Render as wall-clock time in the given offset, e.g. `14:05`
    ///
    /// Returns `None` for values outside chrono's representable range and
    /// for patterns chrono cannot render.
    pub fn format_clock(&self, offset: FixedOffset, pattern: &str) -> Option<String> {
        let utc = DateTime::<Utc>::from_timestamp_millis(self.0)?;
        let mut rendered = String::new();
        write!(rendered, "{}", utc.with_timezone(&offset).format(pattern)).ok()?;
        Some(rendered)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_recent() {
        let ts = Timestamp::now();
        // after 2020-01-01
        assert!(ts.as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_format_clock() {
        // 2024-01-01T13:45:30Z
        let ts = Timestamp::from_millis(1_704_116_730_000);
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(ts.format_clock(utc, "%H:%M").as_deref(), Some("13:45"));

        let ist = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        assert_eq!(ts.format_clock(ist, "%H:%M").as_deref(), Some("19:15"));
    }

    #[test]
    fn test_format_clock_rejects_bad_pattern() {
        let ts = Timestamp::from_millis(1_704_116_730_000);
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(ts.format_clock(utc, "%Q"), None);
    }

    #[test]
    fn test_serde_transparent() {
        let ts = Timestamp::from_millis(42);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "42");
        assert_eq!(serde_json::from_str::<Timestamp>("42").unwrap(), ts);
    }
}
