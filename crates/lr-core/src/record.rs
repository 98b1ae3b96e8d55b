//! # Log Records
//!
//! A [`NewLogRecord`] is what the ingestion path hands to storage: already
//! decoded from the wire format, not yet numbered. Storage assigns the
//! monotonically increasing `log_id` and hands back [`LogRecord`]s on reads.
//! Records are never mutated after they are written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized log record awaiting persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLogRecord {
    pub timestamp: DateTime<Utc>,
    /// When the collector observed the record; may differ from `timestamp`.
    pub observed_timestamp: DateTime<Utc>,
    pub severity_text: Option<String>,
    pub severity_number: i32,
    pub service_name: Option<String>,
    pub scope: Option<String>,
    pub body: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub trace_flags: i32,
    /// Record-level attribute document (a JSON object).
    pub attributes: serde_json::Value,
    /// Resource attribute document, deduplicated by digest in storage.
    pub resource_attributes: serde_json::Value,
}

/// A stored log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub log_id: i64,
    pub timestamp: DateTime<Utc>,
    pub observed_timestamp: DateTime<Utc>,
    pub severity_text: Option<String>,
    pub severity_number: i32,
    pub service_name: Option<String>,
    pub scope: Option<String>,
    pub body: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub trace_flags: i32,
    pub attributes: serde_json::Value,
    pub resource_attributes: serde_json::Value,
}

impl NewLogRecord {
    /// A bare record with empty attribute documents.
    pub fn new(timestamp: DateTime<Utc>, observed_timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            observed_timestamp,
            severity_text: None,
            severity_number: 0,
            service_name: None,
            scope: None,
            body: None,
            trace_id: None,
            span_id: None,
            trace_flags: 0,
            attributes: serde_json::Value::Object(Default::default()),
            resource_attributes: serde_json::Value::Object(Default::default()),
        }
    }
}
