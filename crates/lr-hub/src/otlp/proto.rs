//! OTLP/HTTP protobuf messages for logs.
//!
//! Only the fields the hub stores are declared; prost skips unknown tags.
//! `LogsData` shares its wire layout with `ExportLogsServiceRequest`.

use base64::Engine;
use serde_json::{json, Value};

use super::{Fixed64, InstrumentationScope, KeyValue as JsonKeyValue, Resource as JsonResource};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogsData {
    #[prost(message, repeated, tag = "1")]
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceLogs {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<Resource>,
    #[prost(message, repeated, tag = "2")]
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    #[prost(message, repeated, tag = "1")]
    pub attributes: Vec<KeyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScopeLogs {
    #[prost(message, optional, tag = "1")]
    pub scope: Option<Scope>,
    #[prost(message, repeated, tag = "2")]
    pub log_records: Vec<LogRecord>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Scope {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogRecord {
    #[prost(fixed64, tag = "1")]
    pub time_unix_nano: u64,
    #[prost(fixed64, tag = "11")]
    pub observed_time_unix_nano: u64,
    #[prost(int32, tag = "2")]
    pub severity_number: i32,
    #[prost(string, tag = "3")]
    pub severity_text: String,
    #[prost(message, optional, tag = "5")]
    pub body: Option<AnyValue>,
    #[prost(message, repeated, tag = "6")]
    pub attributes: Vec<KeyValue>,
    #[prost(fixed32, tag = "8")]
    pub flags: u32,
    #[prost(bytes = "vec", tag = "9")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "10")]
    pub span_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<AnyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AnyValue {
    #[prost(oneof = "any_value::Value", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub value: Option<any_value::Value>,
}

pub mod any_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringValue(String),
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
        #[prost(message, tag = "5")]
        ArrayValue(super::ArrayValue),
        #[prost(message, tag = "6")]
        KvlistValue(super::KeyValueList),
        #[prost(bytes, tag = "7")]
        BytesValue(Vec<u8>),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ArrayValue {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<AnyValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValueList {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<KeyValue>,
}

// Conversion into the JSON mapping, so both encodings share one decoder.

impl From<LogsData> for super::LogsData {
    fn from(data: LogsData) -> Self {
        Self {
            resource_logs: data.resource_logs.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ResourceLogs> for super::ResourceLogs {
    fn from(rl: ResourceLogs) -> Self {
        Self {
            resource: rl.resource.map(|r| JsonResource {
                attributes: key_values(r.attributes),
            }),
            scope_logs: rl
                .scope_logs
                .into_iter()
                .map(|sl| super::ScopeLogs {
                    scope: sl.scope.map(|s| InstrumentationScope { name: s.name }),
                    log_records: sl.log_records.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }
    }
}

impl From<LogRecord> for super::LogRecord {
    fn from(log: LogRecord) -> Self {
        Self {
            time_unix_nano: Some(Fixed64::Number(log.time_unix_nano)),
            observed_time_unix_nano: Some(Fixed64::Number(log.observed_time_unix_nano)),
            severity_number: Some(log.severity_number),
            severity_text: Some(log.severity_text),
            body: log.body.map(any_value_json),
            attributes: key_values(log.attributes),
            trace_id: Some(hex::encode(log.trace_id)),
            span_id: Some(hex::encode(log.span_id)),
            flags: Some(log.flags),
        }
    }
}

fn key_values(kvs: Vec<KeyValue>) -> Vec<JsonKeyValue> {
    kvs.into_iter()
        .map(|kv| JsonKeyValue {
            key: kv.key,
            value: kv.value.map(any_value_json),
        })
        .collect()
}

/// Render an `AnyValue` in its OTLP JSON form.
fn any_value_json(value: AnyValue) -> Value {
    use any_value::Value as V;
    match value.value {
        None => json!({}),
        Some(V::StringValue(s)) => json!({ "stringValue": s }),
        Some(V::BoolValue(b)) => json!({ "boolValue": b }),
        Some(V::IntValue(i)) => json!({ "intValue": i }),
        Some(V::DoubleValue(d)) => json!({ "doubleValue": d }),
        Some(V::ArrayValue(array)) => {
            let values: Vec<Value> = array.values.into_iter().map(any_value_json).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Some(V::KvlistValue(list)) => {
            let values: Vec<Value> = list
                .values
                .into_iter()
                .map(|kv| json!({ "key": kv.key, "value": kv.value.map(any_value_json) }))
                .collect();
            json!({ "kvlistValue": { "values": values } })
        }
        Some(V::BytesValue(bytes)) => json!({
            "bytesValue": base64::engine::general_purpose::STANDARD.encode(bytes)
        }),
    }
}
