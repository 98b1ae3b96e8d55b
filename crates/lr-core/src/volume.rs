//! # Severity Volumes
//!
//! Folds free-text severities into six canonical categories and merges raw
//! `(bucket, severity_text, count)` rows into one dense [`Volume`] per bucket.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Bucket width used when a request does not name one.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Other,
}

impl Severity {
    /// Case-insensitive substring match, first hit wins:
    /// ERROR/FATAL/CRITICAL, WARN, INFO, DEBUG, TRACE, else OTHER.
    pub fn categorize(text: Option<&str>) -> Severity {
        let Some(text) = text else {
            return Severity::Other;
        };
        let upper = text.to_ascii_uppercase();
        if upper.contains("ERROR") || upper.contains("FATAL") || upper.contains("CRITICAL") {
            Severity::Error
        } else if upper.contains("WARN") {
            Severity::Warn
        } else if upper.contains("INFO") {
            Severity::Info
        } else if upper.contains("DEBUG") {
            Severity::Debug
        } else if upper.contains("TRACE") {
            Severity::Trace
        } else {
            Severity::Other
        }
    }
}

/// One raw aggregation row as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityCount {
    pub bucket: String,
    pub severity_text: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Bucket start, `YYYY-MM-DDTHH:MM:00Z`.
    pub date: String,
    pub error: u64,
    pub warn: u64,
    pub info: u64,
    pub debug: u64,
    pub trace: u64,
    pub other: u64,
}

impl Volume {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            error: 0,
            warn: 0,
            info: 0,
            debug: 0,
            trace: 0,
            other: 0,
        }
    }

    pub fn add(&mut self, severity: Severity, count: u64) {
        let slot = match severity {
            Severity::Error => &mut self.error,
            Severity::Warn => &mut self.warn,
            Severity::Info => &mut self.info,
            Severity::Debug => &mut self.debug,
            Severity::Trace => &mut self.trace,
            Severity::Other => &mut self.other,
        };
        *slot += count;
    }

    pub fn total(&self) -> u64 {
        self.error + self.warn + self.info + self.debug + self.trace + self.other
    }
}

/// Merge rows into volumes, preserving the order buckets are first seen.
pub fn aggregate<I>(rows: I) -> Vec<Volume>
where
    I: IntoIterator<Item = SeverityCount>,
{
    let mut volumes: Vec<Volume> = Vec::new();
    for row in rows {
        let severity = Severity::categorize(row.severity_text.as_deref());
        // Rows arrive grouped by bucket, so the match is almost always the last one.
        match volumes.iter_mut().rev().find(|v| v.date == row.bucket) {
            Some(volume) => volume.add(severity, row.count),
            None => {
                let mut volume = Volume::empty(row.bucket);
                volume.add(severity, row.count);
                volumes.push(volume);
            }
        }
    }
    volumes
}

/// Parse a bucket width into minutes.
///
/// Accepts ISO-8601 durations of whole minutes or hours (`PT10M`, `PT1H`,
/// `PT1H30M`), a suffixed count (`15m`, `2h`) or a bare count of minutes.
pub fn parse_interval(text: &str) -> Result<u32> {
    let invalid = || CoreError::InvalidInterval(text.to_string());
    let trimmed = text.trim();

    let minutes = if let Some(rest) = trimmed
        .strip_prefix("PT")
        .or_else(|| trimmed.strip_prefix("pt"))
    {
        parse_iso_time(rest).ok_or_else(invalid)?
    } else if let Some(n) = trimmed.strip_suffix(['m', 'M']) {
        n.parse::<u32>().map_err(|_| invalid())?
    } else if let Some(n) = trimmed.strip_suffix(['h', 'H']) {
        n.parse::<u32>()
            .ok()
            .and_then(|h| h.checked_mul(60))
            .ok_or_else(invalid)?
    } else {
        trimmed.parse::<u32>().map_err(|_| invalid())?
    };

    if minutes == 0 {
        return Err(invalid());
    }
    Ok(minutes)
}

/// `1H30M`, `10M`, `2H` → minutes.
fn parse_iso_time(rest: &str) -> Option<u32> {
    let mut total: u32 = 0;
    let mut digits = String::new();
    let mut seen_unit = false;
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            'H' | 'h' | 'M' | 'm' => {
                let n: u32 = digits.parse().ok()?;
                digits.clear();
                let factor = if matches!(c, 'H' | 'h') { 60 } else { 1 };
                total = total.checked_add(n.checked_mul(factor)?)?;
                seen_unit = true;
            }
            _ => return None,
        }
    }
    if !digits.is_empty() || !seen_unit {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(bucket: &str, severity: Option<&str>, count: u64) -> SeverityCount {
        SeverityCount {
            bucket: bucket.into(),
            severity_text: severity.map(String::from),
            count,
        }
    }

    #[test]
    fn test_categorize() {
        for s in ["ERROR", "error", "FATAL: oom", "CRITICAL-path", "Warn-and-Error"] {
            assert_eq!(Severity::categorize(Some(s)), Severity::Error, "{}", s);
        }
        assert_eq!(Severity::categorize(Some("WARN")), Severity::Warn);
        assert_eq!(Severity::categorize(Some("warning")), Severity::Warn);
        assert_eq!(Severity::categorize(Some("Info")), Severity::Info);
        assert_eq!(Severity::categorize(Some("debug2")), Severity::Debug);
        assert_eq!(Severity::categorize(Some("TRACE")), Severity::Trace);
        assert_eq!(Severity::categorize(Some("")), Severity::Other);
        assert_eq!(Severity::categorize(Some("UNKNOWN")), Severity::Other);
        assert_eq!(Severity::categorize(None), Severity::Other);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let b = "2024-01-01T00:00:00Z";
        let rows = vec![
            row(b, Some("INFO"), 3),
            row(b, Some("ERROR"), 2),
            row(b, Some("INFO"), 1),
        ];
        let mut expected = Volume::empty(b);
        expected.info = 4;
        expected.error = 2;

        assert_eq!(aggregate(rows.clone()), vec![expected.clone()]);
        let mut reversed = rows;
        reversed.reverse();
        assert_eq!(aggregate(reversed), vec![expected]);
    }

    #[test]
    fn test_buckets_keep_first_seen_order() {
        let volumes = aggregate(vec![
            row("2024-01-01T00:00:00Z", Some("info"), 1),
            row("2024-01-01T00:10:00Z", None, 5),
            row("2024-01-01T00:10:00Z", Some("fatal"), 1),
            row("2024-01-01T00:20:00Z", Some("TRACE"), 2),
        ]);
        let dates: Vec<&str> = volumes.iter().map(|v| v.date.as_str()).collect();
        assert_eq!(
            dates,
            vec![
                "2024-01-01T00:00:00Z",
                "2024-01-01T00:10:00Z",
                "2024-01-01T00:20:00Z"
            ]
        );
        assert_eq!(volumes[1].other, 5);
        assert_eq!(volumes[1].error, 1);
        assert_eq!(volumes[1].total(), 6);
        assert_eq!(volumes[2].trace, 2);
    }

    #[test]
    fn test_volume_json_shape() {
        let json = serde_json::to_value(Volume::empty("2024-01-01T00:00:00Z")).unwrap();
        assert_eq!(json["date"], "2024-01-01T00:00:00Z");
        assert_eq!(json["error"], 0);
        assert_eq!(json["other"], 0);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("PT10M").unwrap(), 10);
        assert_eq!(parse_interval("PT1H").unwrap(), 60);
        assert_eq!(parse_interval("PT1H30M").unwrap(), 90);
        assert_eq!(parse_interval("15m").unwrap(), 15);
        assert_eq!(parse_interval("2h").unwrap(), 120);
        assert_eq!(parse_interval("5").unwrap(), 5);
        for bad in ["", "PT", "PT0M", "0", "PT10S", "abc", "-5", "PT5"] {
            assert!(
                matches!(parse_interval(bad), Err(CoreError::InvalidInterval(_))),
                "{:?}",
                bad
            );
        }
    }
}
