//! # Search Query Builder
//!
//! One [`SearchQuery`] per request. The FROM/WHERE part is built once and
//! shared by the four statement shapes the store runs: a page of rows, a
//! count, severity volume rows and the id list used by bulk delete.
//!
//! All values are bound as positional `?` parameters in the order they
//! appear in the WHERE clause. The only text spliced into the SQL is the
//! structured filter fragment, which `filter::compile` produces with its own
//! literal escaping.

use chrono::{DateTime, Utc};

use crate::cursor::Cursor;
use crate::query::{compile_query, is_unconstrained};

/// Columns of a full row, in the order `LogStore` maps them.
pub const LOG_COLUMNS: &str = "log.log_id, log.timestamp, log.observed_timestamp, \
     log.severity_text, log.severity_number, log.service_name, log.scope, log.body, \
     log.trace_id, log.span_id, log.trace_flags, log.attributes, \
     resource_attributes.resource_attributes";

const FROM_LOG: &str = "FROM log \
     JOIN resource_attributes ON log.resource_attributes_digest = resource_attributes.digest";

const FROM_LOG_FTS: &str = "FROM log_fts \
     JOIN log ON log_fts.rowid = log.log_id \
     JOIN resource_attributes ON log.resource_attributes_digest = resource_attributes.digest";

/// Observed time in fractional seconds; `strftime` floors it, so times
/// before the epoch stay in their own minute.
const OBSERVED_SECONDS: &str = "log.observed_timestamp / 1000.0";

const ORDER_NEWEST_FIRST: &str =
    "ORDER BY log.observed_timestamp DESC, log.timestamp DESC, log.log_id DESC";

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Integer(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// Free text in the query language.
    pub query: Option<String>,
    /// Already compiled structured filter fragment.
    pub filter_predicate: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cursor: Option<Cursor>,
    /// 0 means unbounded.
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    uses_index: bool,
    where_clause: String,
    params: Vec<SqlParam>,
}

impl SearchQuery {
    pub fn build(request: &SearchRequest) -> Self {
        let predicate = request
            .query
            .as_deref()
            .map(compile_query)
            .filter(|p| !is_unconstrained(p));

        let mut where_clause = String::from("WHERE 1 = 1");
        let mut params = Vec::new();

        if let Some(cursor) = &request.cursor {
            let observed = cursor.observed_timestamp.timestamp_millis();
            let timestamp = cursor.timestamp.timestamp_millis();
            where_clause.push_str(
                " AND (log.observed_timestamp < ? OR (log.observed_timestamp = ? \
                 AND (log.timestamp < ? OR (log.timestamp = ? AND log.log_id < ?))))",
            );
            params.extend([
                SqlParam::Integer(observed),
                SqlParam::Integer(observed),
                SqlParam::Integer(timestamp),
                SqlParam::Integer(timestamp),
                SqlParam::Integer(cursor.log_id),
            ]);
        }

        if let Some(from) = request.from {
            where_clause.push_str(" AND log.observed_timestamp >= ?");
            params.push(SqlParam::Integer(from.timestamp_millis()));
        }
        if let Some(to) = request.to {
            where_clause.push_str(" AND log.observed_timestamp <= ?");
            params.push(SqlParam::Integer(to.timestamp_millis()));
        }

        let uses_index = predicate.is_some();
        if let Some(predicate) = predicate {
            where_clause.push_str(" AND log_fts MATCH ?");
            params.push(SqlParam::Text(predicate));
        }

        if let Some(filter) = request.filter_predicate.as_deref() {
            if !filter.trim().is_empty() {
                where_clause.push_str(" AND (");
                where_clause.push_str(filter);
                where_clause.push(')');
            }
        }

        Self {
            uses_index,
            where_clause,
            params,
        }
    }

    /// Whether the full-text index takes part in the query.
    pub fn uses_index(&self) -> bool {
        self.uses_index
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    fn from_clause(&self) -> &'static str {
        if self.uses_index {
            FROM_LOG_FTS
        } else {
            FROM_LOG
        }
    }

    /// Newest rows first, at most `page_size` of them when non-zero.
    pub fn select_logs(&self, page_size: usize) -> String {
        let mut sql = format!(
            "SELECT {} {} {} {}",
            LOG_COLUMNS,
            self.from_clause(),
            self.where_clause,
            ORDER_NEWEST_FIRST
        );
        if page_size > 0 {
            sql.push_str(&format!(" LIMIT {}", page_size));
        }
        sql
    }

    pub fn select_count(&self) -> String {
        format!(
            "SELECT COUNT(*) {} {}",
            self.from_clause(),
            self.where_clause
        )
    }

    /// `(bucket, severity_text, count)` rows, buckets ascending.
    ///
    /// A bucket keeps the date and hour of the observed time and floors the
    /// minute within that hour to a multiple of `interval_minutes`, rendered
    /// as `YYYY-MM-DDTHH:MM:00Z`. Intervals of an hour or more therefore
    /// bucket by hour.
    pub fn select_volumes(&self, interval_minutes: u32) -> String {
        let interval = interval_minutes.max(1);
        format!(
            "SELECT strftime('%Y-%m-%dT%H:', {observed}, 'unixepoch') \
             || printf('%02d', (CAST(strftime('%M', {observed}, 'unixepoch') AS INTEGER) / {interval}) * {interval}) \
             || ':00Z' AS bucket, \
             log.severity_text, COUNT(*) {} {} \
             GROUP BY bucket, log.severity_text ORDER BY bucket ASC",
            self.from_clause(),
            self.where_clause,
            observed = OBSERVED_SECONDS,
            interval = interval
        )
    }

    pub fn select_ids(&self) -> String {
        format!(
            "SELECT log.log_id {} {}",
            self.from_clause(),
            self.where_clause
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_empty_request_skips_index() {
        let q = SearchQuery::build(&SearchRequest::default());
        assert!(!q.uses_index());
        assert!(q.params().is_empty());
        let sql = q.select_logs(0);
        assert!(sql.contains("FROM log JOIN resource_attributes"));
        assert!(!sql.contains("log_fts"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_unconstrained_query_skips_index() {
        for text in ["", "   ", "()", "status:[1 TO 2]", "\"unterminated"] {
            let q = SearchQuery::build(&SearchRequest {
                query: Some(text.into()),
                ..Default::default()
            });
            assert!(!q.uses_index(), "query {:?} should not use the index", text);
            assert!(!q.select_count().contains("MATCH"));
        }
    }

    #[test]
    fn test_text_query_joins_index_and_binds_predicate() {
        let q = SearchQuery::build(&SearchRequest {
            query: Some("timeout OR refused".into()),
            ..Default::default()
        });
        assert!(q.uses_index());
        assert!(q.select_logs(10).contains("FROM log_fts JOIN log ON log_fts.rowid = log.log_id"));
        assert!(q.select_logs(10).ends_with("LIMIT 10"));
        assert_eq!(
            q.params(),
            &[SqlParam::Text(r#"("timeout" OR "refused")"#.into())]
        );
    }

    #[test]
    fn test_parameter_order_follows_clause_order() {
        let cursor = Cursor {
            observed_timestamp: ts(5_000),
            timestamp: ts(4_000),
            log_id: 17,
        };
        let q = SearchQuery::build(&SearchRequest {
            query: Some("error".into()),
            filter_predicate: Some("log.service_name = 'api'".into()),
            from: Some(ts(1_000)),
            to: Some(ts(9_000)),
            cursor: Some(cursor),
            page_size: 30,
        });
        assert_eq!(
            q.params(),
            &[
                SqlParam::Integer(5_000),
                SqlParam::Integer(5_000),
                SqlParam::Integer(4_000),
                SqlParam::Integer(4_000),
                SqlParam::Integer(17),
                SqlParam::Integer(1_000),
                SqlParam::Integer(9_000),
                SqlParam::Text("\"error\"".into()),
            ]
        );
        let sql = q.select_ids();
        assert_eq!(sql.matches('?').count(), q.params().len());
        assert!(sql.ends_with("AND (log.service_name = 'api')"));
    }

    #[test]
    fn test_shapes_share_where_clause() {
        let q = SearchQuery::build(&SearchRequest {
            query: Some("disk".into()),
            from: Some(ts(0)),
            ..Default::default()
        });
        let where_part = "WHERE 1 = 1 AND log.observed_timestamp >= ? AND log_fts MATCH ?";
        assert!(q.select_logs(5).contains(where_part));
        assert!(q.select_count().contains(where_part));
        assert!(q.select_volumes(10).contains(where_part));
        assert!(q.select_ids().contains(where_part));
    }

    #[test]
    fn test_list_ordering() {
        let q = SearchQuery::build(&SearchRequest::default());
        assert!(q.select_logs(1).contains(
            "ORDER BY log.observed_timestamp DESC, log.timestamp DESC, log.log_id DESC"
        ));
    }

    #[test]
    fn test_volume_bucketing() {
        let sql = SearchQuery::build(&SearchRequest::default()).select_volumes(15);
        assert!(sql.contains("strftime('%Y-%m-%dT%H:', log.observed_timestamp / 1000.0, 'unixepoch')"));
        assert!(sql.contains("AS INTEGER) / 15) * 15)"));
        assert!(sql.contains("ORDER BY bucket ASC"));
        assert!(SearchQuery::build(&SearchRequest::default())
            .select_volumes(0)
            .contains("/ 1) * 1)"));
    }
}
