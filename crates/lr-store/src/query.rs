//! Search, count, volume and delete over [`SearchRequest`]s.

use chrono::{DateTime, Utc};
use lr_core::delete::{delete_in_batches, delete_statement, DELETE_BATCH_SIZE};
use lr_core::volume::aggregate;
use lr_core::{Cursor, LogRecord, PageToken, SearchQuery, SearchRequest, SeverityCount, SqlParam, Volume};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::LogStore;

fn bind(params: &[SqlParam]) -> Vec<Value> {
    params
        .iter()
        .map(|p| match p {
            SqlParam::Integer(i) => Value::Integer(*i),
            SqlParam::Text(s) => Value::Text(s.clone()),
        })
        .collect()
}

fn millis(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn json(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Maps a row selected with `lr_core::search::LOG_COLUMNS`.
fn map_log_row(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    Ok(LogRecord {
        log_id: row.get(0)?,
        timestamp: millis(row, 1)?,
        observed_timestamp: millis(row, 2)?,
        severity_text: row.get(3)?,
        severity_number: row.get(4)?,
        service_name: row.get(5)?,
        scope: row.get(6)?,
        body: row.get(7)?,
        trace_id: row.get(8)?,
        span_id: row.get(9)?,
        trace_flags: row.get(10)?,
        attributes: json(row, 11)?,
        resource_attributes: json(row, 12)?,
    })
}

impl LogStore {
    /// Newest first, at most `request.page_size` rows (0 = all).
    pub fn find_latest_logs(&self, request: &SearchRequest) -> Result<Vec<LogRecord>> {
        let query = SearchQuery::build(request);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&query.select_logs(request.page_size))?;
        let rows = stmt.query_map(params_from_iter(bind(query.params())), map_log_row)?;
        let logs = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    pub fn count(&self, request: &SearchRequest) -> Result<u64> {
        let query = SearchQuery::build(request);
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &query.select_count(),
            params_from_iter(bind(query.params())),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Severity volumes per `interval_minutes` bucket, oldest bucket first.
    pub fn find_volumes(&self, request: &SearchRequest, interval_minutes: u32) -> Result<Vec<Volume>> {
        let query = SearchQuery::build(request);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&query.select_volumes(interval_minutes))?;
        let rows = stmt.query_map(params_from_iter(bind(query.params())), |row| {
            let count: i64 = row.get(2)?;
            Ok(SeverityCount {
                bucket: row.get(0)?,
                severity_text: row.get(1)?,
                count: count.max(0) as u64,
            })
        })?;
        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(aggregate(rows))
    }

    /// Delete every log matching `request`, ignoring its page size.
    ///
    /// Id resolution and all batches run in one transaction; any failure
    /// rolls the whole delete back.
    pub fn delete(&self, request: &SearchRequest) -> Result<usize> {
        let query = SearchQuery::build(request);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(&query.select_ids())?;
            let rows = stmt.query_map(params_from_iter(bind(query.params())), |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let deleted = delete_in_batches(&ids, DELETE_BATCH_SIZE, |batch| {
            tx.execute(&delete_statement(batch.len()), params_from_iter(batch))
        })?;
        tx.commit()?;

        debug!(deleted, "Deleted logs");
        Ok(deleted)
    }

    /// Complete a wire cursor with the observed timestamp of the row it names.
    ///
    /// When that row is gone the token's own timestamp stands in.
    pub fn resolve_cursor(&self, token: PageToken) -> Result<Cursor> {
        let conn = self.conn.lock();
        let observed: Option<i64> = conn
            .query_row(
                "SELECT observed_timestamp FROM log WHERE log_id = ?1",
                [token.log_id],
                |row| row.get(0),
            )
            .optional()?;

        let observed = observed.and_then(DateTime::from_timestamp_millis);
        match observed {
            Some(observed) => Ok(token.anchored_at(observed)),
            None => {
                warn!(log_id = token.log_id, "Cursor row no longer exists, anchoring on its timestamp");
                Ok(token.anchored_at(token.timestamp))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{record, table_count};
    use serde_json::json;
    use std::collections::HashSet;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn query(text: &str) -> SearchRequest {
        SearchRequest {
            query: Some(text.into()),
            ..Default::default()
        }
    }

    fn seeded() -> LogStore {
        let store = LogStore::open_in_memory().unwrap();
        store
            .add_all(&[
                record(1_000, "INFO", "checkout", "order placed"),
                record(2_000, "ERROR", "checkout", "payment timeout"),
                record(3_000, "WARN", "inventory", "stock low"),
                record(4_000, "ERROR", "inventory", "connection timeout"),
                record(5_000, "DEBUG", "checkout", "cart updated"),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_list_newest_first_with_fields() {
        let store = seeded();
        let logs = store.find_latest_logs(&SearchRequest::default()).unwrap();
        let bodies: Vec<_> = logs.iter().filter_map(|l| l.body.as_deref()).collect();
        assert_eq!(
            bodies,
            vec!["cart updated", "connection timeout", "stock low", "payment timeout", "order placed"]
        );
        let newest = &logs[0];
        assert_eq!(newest.observed_timestamp, ts(5_000));
        assert_eq!(newest.severity_text.as_deref(), Some("DEBUG"));
        assert_eq!(newest.resource_attributes, json!({"service.name": "checkout"}));
        assert_eq!(newest.attributes, json!({}));
    }

    #[test]
    fn test_full_text_search() {
        let store = seeded();
        let logs = store.find_latest_logs(&query("timeout")).unwrap();
        assert_eq!(logs.len(), 2);

        let logs = store.find_latest_logs(&query("timeout service_name:checkout")).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].body.as_deref(), Some("payment timeout"));

        let logs = store.find_latest_logs(&query("stock OR cart")).unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn test_unconstrained_query_matches_everything() {
        let store = seeded();
        assert_eq!(store.count(&query("status:[1 TO 2]")).unwrap(), 5);
        assert_eq!(store.count(&query("\"unterminated")).unwrap(), 5);
    }

    #[test]
    fn test_leading_not_is_query_syntax_error() {
        let store = seeded();
        let err = store.find_latest_logs(&query("NOT timeout")).unwrap_err();
        assert!(err.is_query_syntax(), "{}", err);
    }

    #[test]
    fn test_count_with_filter_and_range() {
        let store = seeded();
        let request = SearchRequest {
            filter_predicate: Some("log.service_name = 'checkout'".into()),
            from: Some(ts(2_000)),
            to: Some(ts(5_000)),
            ..Default::default()
        };
        assert_eq!(store.count(&request).unwrap(), 2);
    }

    #[test]
    fn test_filter_on_attributes() {
        let store = LogStore::open_in_memory().unwrap();
        let mut r = record(1_000, "INFO", "api", "GET /");
        r.attributes = json!({"http.status_code": 503});
        let mut ok = record(2_000, "INFO", "api", "GET /health");
        ok.attributes = json!({"http.status_code": 200});
        store.add_all(&[r, ok]).unwrap();

        let predicate = lr_core::filter::compile("attributes.http.status_code >= 500").unwrap();
        let logs = store
            .find_latest_logs(&SearchRequest {
                filter_predicate: predicate,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].body.as_deref(), Some("GET /"));

        let predicate = lr_core::filter::compile("resource.service.name == 'api'").unwrap();
        let count = store
            .count(&SearchRequest {
                filter_predicate: predicate,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_pagination_walks_every_row_once() {
        let store = LogStore::open_in_memory().unwrap();
        // Several rows share observed/timestamp pairs so log_id decides.
        let mut records = Vec::new();
        for i in 0..7 {
            let mut r = record(10_000, "INFO", "api", &format!("row {}", i));
            r.timestamp = ts(9_000 + (i % 2) * 500);
            records.push(r);
        }
        records.push(record(20_000, "INFO", "api", "newest"));
        records.push(record(1_000, "INFO", "api", "oldest"));
        store.add_all(&records).unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = store
                .find_latest_logs(&SearchRequest {
                    cursor,
                    page_size: 2,
                    ..Default::default()
                })
                .unwrap();
            seen.extend(page.iter().map(|l| l.log_id));
            if page.len() < 2 {
                break;
            }
            let token = Cursor::of(page.last().unwrap()).token();
            let wire = token.to_string();
            cursor = Some(store.resolve_cursor(wire.parse().unwrap()).unwrap());
        }

        assert_eq!(seen.len(), 9);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 9);

        let all = store.find_latest_logs(&SearchRequest::default()).unwrap();
        let expected: Vec<i64> = all.iter().map(|l| l.log_id).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_resolve_cursor_falls_back_for_missing_row() {
        let store = seeded();
        let token = PageToken {
            timestamp: ts(3_500),
            log_id: 999,
        };
        let cursor = store.resolve_cursor(token).unwrap();
        assert_eq!(cursor.observed_timestamp, ts(3_500));
    }

    #[test]
    fn test_volumes() {
        let store = LogStore::open_in_memory().unwrap();
        let minute = 60_000;
        store
            .add_all(&[
                record(minute, "INFO", "api", "a"),
                record(9 * minute, "ERROR", "api", "b"),
                record(9 * minute + 59_999, "info", "api", "c"),
                record(12 * minute, "WARN", "api", "d"),
                record(12 * minute, "", "api", "e"),
            ])
            .unwrap();

        let volumes = store.find_volumes(&SearchRequest::default(), 10).unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].date, "1970-01-01T00:00:00Z");
        assert_eq!((volumes[0].info, volumes[0].error), (2, 1));
        assert_eq!(volumes[1].date, "1970-01-01T00:10:00Z");
        assert_eq!((volumes[1].warn, volumes[1].other), (1, 1));
    }

    #[test]
    fn test_volume_buckets_floor_minute_within_hour() {
        let store = LogStore::open_in_memory().unwrap();
        let at_01_50 = (60 + 50) * 60_000;
        store.add_all(&[record(at_01_50, "INFO", "api", "late")]).unwrap();

        let volumes = store.find_volumes(&SearchRequest::default(), 45).unwrap();
        assert_eq!(volumes[0].date, "1970-01-01T01:45:00Z");

        let volumes = store.find_volumes(&SearchRequest::default(), 120).unwrap();
        assert_eq!(volumes[0].date, "1970-01-01T01:00:00Z");
    }

    #[test]
    fn test_volume_buckets_before_epoch() {
        let store = LogStore::open_in_memory().unwrap();
        store.add_all(&[record(-30_000, "WARN", "api", "early")]).unwrap();

        let volumes = store.find_volumes(&SearchRequest::default(), 10).unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].date, "1969-12-31T23:50:00Z");
        assert_eq!(volumes[0].warn, 1);
    }

    #[test]
    fn test_failed_delete_rolls_back() {
        let store = LogStore::open_in_memory().unwrap();
        let records: Vec<_> = (0..2500)
            .map(|i| record(i * 10, "INFO", "bulk", "bulk row"))
            .collect();
        store.add_all(&records).unwrap();
        store
            .conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER refuse_delete BEFORE DELETE ON log \
                 WHEN old.log_id = 1500 BEGIN SELECT RAISE(ABORT, 'refused'); END;",
            )
            .unwrap();

        assert!(store.delete(&SearchRequest::default()).is_err());
        assert_eq!(store.count(&SearchRequest::default()).unwrap(), 2500);
        assert_eq!(store.count(&query("bulk")).unwrap(), 2500);
    }

    #[test]
    fn test_delete_matching_only() {
        let store = seeded();
        let deleted = store.delete(&query("timeout")).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count(&SearchRequest::default()).unwrap(), 3);
        assert!(store.find_latest_logs(&query("timeout")).unwrap().is_empty());
    }

    #[test]
    fn test_delete_ignores_page_size() {
        let store = LogStore::open_in_memory().unwrap();
        let records: Vec<_> = (0..2500)
            .map(|i| record(i * 10, "INFO", "bulk", "bulk row"))
            .collect();
        store.add_all(&records).unwrap();

        let deleted = store
            .delete(&SearchRequest {
                page_size: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(deleted, 2500);
        assert_eq!(table_count(&store, "log"), 0);
    }
}
