//! # Pagination Cursors
//!
//! A [`Cursor`] is the full sort key of the last row of a page. Only part of
//! it travels over the wire: the [`PageToken`] string `"<timestamp>,<logId>"`.
//! The observed timestamp is recovered by the store from the row the token
//! names (see `LogStore::resolve_cursor`), so the token alone is not enough to
//! build the keyset predicate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::record::LogRecord;

/// Sort key `(observed_timestamp, timestamp, log_id)` of a returned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub observed_timestamp: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub log_id: i64,
}

impl Cursor {
    pub fn of(record: &LogRecord) -> Self {
        Self {
            observed_timestamp: record.observed_timestamp,
            timestamp: record.timestamp,
            log_id: record.log_id,
        }
    }

    /// The externally visible part of this cursor.
    pub fn token(&self) -> PageToken {
        PageToken {
            timestamp: self.timestamp,
            log_id: self.log_id,
        }
    }
}

/// The wire form of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken {
    pub timestamp: DateTime<Utc>,
    pub log_id: i64,
}

impl PageToken {
    pub fn anchored_at(self, observed_timestamp: DateTime<Utc>) -> Cursor {
        Cursor {
            observed_timestamp,
            timestamp: self.timestamp,
            log_id: self.log_id,
        }
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.log_id
        )
    }
}

impl FromStr for PageToken {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}

pub fn encode(token: &PageToken) -> String {
    token.to_string()
}

pub fn decode(s: &str) -> Result<PageToken> {
    let (instant, id) = s
        .split_once(',')
        .ok_or_else(|| CoreError::malformed_cursor(s, "missing ',' separator"))?;

    let timestamp = DateTime::parse_from_rfc3339(instant)
        .map_err(|e| CoreError::malformed_cursor(s, format!("invalid instant: {}", e)))?
        .with_timezone(&Utc);

    let log_id = id
        .parse::<i64>()
        .map_err(|_| CoreError::malformed_cursor(s, format!("non-numeric id '{}'", id)))?;

    Ok(PageToken { timestamp, log_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_encode_format() {
        let token = PageToken {
            timestamp: ts(1_700_000_000_123),
            log_id: 42,
        };
        assert_eq!(encode(&token), "2023-11-14T22:13:20.123Z,42");
    }

    #[test]
    fn test_round_trip() {
        for (ms, id) in [(0, 1), (1_700_000_000_000, 42), (1_700_000_000_999, i64::MAX)] {
            let token = PageToken {
                timestamp: ts(ms),
                log_id: id,
            };
            assert_eq!(decode(&encode(&token)).unwrap(), token);
        }
    }

    #[test]
    fn test_round_trip_nanos() {
        let timestamp = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let token = PageToken { timestamp, log_id: 9 };
        assert_eq!(token.to_string().parse::<PageToken>().unwrap(), token);
    }

    #[test]
    fn test_decode_accepts_offset_instant() {
        let token = decode("2023-11-14T23:13:20+01:00,5").unwrap();
        assert_eq!(token.timestamp, ts(1_700_000_000_000));
        assert_eq!(token.log_id, 5);
    }

    #[test]
    fn test_decode_failures() {
        for bad in [
            "2023-11-14T22:13:20Z",
            "yesterday,5",
            "2023-11-14T22:13:20Z,abc",
            "2023-11-14T22:13:20Z,",
            "",
        ] {
            assert!(
                matches!(decode(bad), Err(CoreError::MalformedCursor { .. })),
                "expected MalformedCursor for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_anchoring() {
        let token = PageToken {
            timestamp: ts(1_000),
            log_id: 3,
        };
        let cursor = token.anchored_at(ts(2_000));
        assert_eq!(cursor.observed_timestamp, ts(2_000));
        assert_eq!(cursor.token(), token);
    }
}
