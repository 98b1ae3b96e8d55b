//! # OTLP/HTTP JSON Logs
//!
//! Decodes `ExportLogsServiceRequest` bodies (the JSON encoding of
//! `LogsData`) into [`NewLogRecord`]s. 64-bit integers may arrive as JSON
//! strings or numbers; both are accepted. Binary protobuf bodies are
//! decoded by [`proto`] and converted into the same structures first.

use chrono::{DateTime, Utc};
use lr_core::NewLogRecord;
use prost::Message;
use serde::Deserialize;
use serde_json::{Map, Value};

pub mod proto;

/// Low 8 bits of `flags` are the W3C trace flags; the rest are reserved.
const TRACE_FLAGS_MASK: u32 = 0xff;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsData {
    #[serde(default)]
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    #[serde(default)]
    pub resource: Option<Resource>,
    #[serde(default)]
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    #[serde(default)]
    pub scope: Option<InstrumentationScope>,
    #[serde(default)]
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstrumentationScope {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub time_unix_nano: Option<Fixed64>,
    #[serde(default)]
    pub observed_time_unix_nano: Option<Fixed64>,
    #[serde(default)]
    pub severity_number: Option<i32>,
    #[serde(default)]
    pub severity_text: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub flags: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}

/// A `fixed64` field: JSON encoders emit these as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Fixed64 {
    Number(u64),
    Text(String),
}

impl Fixed64 {
    fn get(&self) -> u64 {
        match self {
            Fixed64::Number(n) => *n,
            Fixed64::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

/// Decode a binary `ExportLogsServiceRequest` body.
pub fn decode_protobuf(
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Vec<NewLogRecord>, prost::DecodeError> {
    let data = proto::LogsData::decode(body)?;
    Ok(decode(data.into(), received_at))
}

/// Flatten every record in `data`. `received_at` stands in for missing
/// timestamps.
pub fn decode(data: LogsData, received_at: DateTime<Utc>) -> Vec<NewLogRecord> {
    let mut records = Vec::new();
    for resource_logs in data.resource_logs {
        let resource_attributes = resource_logs
            .resource
            .map(|r| attributes_to_json(&r.attributes))
            .unwrap_or_else(|| Value::Object(Map::new()));
        let service_name = resource_attributes
            .get("service.name")
            .and_then(Value::as_str)
            .map(String::from);

        for scope_logs in resource_logs.scope_logs {
            let scope = scope_logs
                .scope
                .map(|s| s.name)
                .filter(|name| !name.is_empty());

            for log in scope_logs.log_records {
                let observed = log
                    .observed_time_unix_nano
                    .as_ref()
                    .map(Fixed64::get)
                    .filter(|n| *n > 0)
                    .and_then(from_unix_nanos)
                    .unwrap_or(received_at);
                let timestamp = log
                    .time_unix_nano
                    .as_ref()
                    .map(Fixed64::get)
                    .filter(|n| *n > 0)
                    .and_then(from_unix_nanos)
                    .unwrap_or(observed);

                let mut record = NewLogRecord::new(timestamp, observed);
                record.severity_text = log.severity_text.filter(|s| !s.is_empty());
                record.severity_number = log.severity_number.unwrap_or(0);
                record.service_name = service_name.clone();
                record.scope = scope.clone();
                record.body = log.body.as_ref().and_then(body_text);
                record.trace_id = log.trace_id.filter(|s| !s.is_empty());
                record.span_id = log.span_id.filter(|s| !s.is_empty());
                record.trace_flags = (log.flags.unwrap_or(0) & TRACE_FLAGS_MASK) as i32;
                record.attributes = attributes_to_json(&log.attributes);
                record.resource_attributes = resource_attributes.clone();
                records.push(record);
            }
        }
    }
    records
}

fn from_unix_nanos(nanos: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(nanos / 1_000_000_000).ok()?;
    DateTime::from_timestamp(secs, (nanos % 1_000_000_000) as u32)
}

/// String bodies are kept verbatim; anything else is stored as JSON text.
fn body_text(body: &Value) -> Option<String> {
    match any_value(body) {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn attributes_to_json(attributes: &[KeyValue]) -> Value {
    let map = attributes
        .iter()
        .map(|kv| {
            let value = kv.value.as_ref().map(any_value).unwrap_or(Value::Null);
            (kv.key.clone(), value)
        })
        .collect::<Map<String, Value>>();
    Value::Object(map)
}

/// Unwrap an OTLP `AnyValue` into plain JSON.
fn any_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    if let Some(s) = obj.get("stringValue") {
        return s.clone();
    }
    if let Some(b) = obj.get("boolValue") {
        return b.clone();
    }
    if let Some(i) = obj.get("intValue") {
        return match i {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(s.clone())),
            other => other.clone(),
        };
    }
    if let Some(d) = obj.get("doubleValue") {
        return d.clone();
    }
    if let Some(b) = obj.get("bytesValue") {
        return b.clone();
    }
    if let Some(array) = obj.get("arrayValue") {
        let values: Vec<Value> = array
            .get("values")
            .and_then(Value::as_array)
            .map(|vs| vs.iter().map(any_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(kvlist) = obj.get("kvlistValue") {
        let entries: Vec<KeyValue> = kvlist
            .get("values")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        return attributes_to_json(&entries);
    }
    Value::Null
}
