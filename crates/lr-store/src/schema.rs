//! Database schema.
//!
//! `log_fts` is an external-content FTS5 table over `log`; the triggers keep
//! it in step with inserts and deletes. Records are immutable, so there is
//! no update trigger. Timestamps are epoch milliseconds.

use rusqlite::Connection;

use crate::error::Result;

/// Applied to file-backed databases only; `:memory:` has no WAL.
pub const FILE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
"#;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resource_attributes (
    digest TEXT PRIMARY KEY,
    resource_attributes TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS log (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    observed_timestamp INTEGER NOT NULL,
    severity_text TEXT,
    severity_number INTEGER NOT NULL DEFAULT 0,
    service_name TEXT,
    scope TEXT,
    body TEXT,
    trace_id TEXT,
    span_id TEXT,
    trace_flags INTEGER NOT NULL DEFAULT 0,
    attributes TEXT NOT NULL DEFAULT '{}',
    resource_attributes_digest TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_log_observed
    ON log (observed_timestamp DESC, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_log_resource
    ON log (resource_attributes_digest);

CREATE VIRTUAL TABLE IF NOT EXISTS log_fts USING fts5(
    body,
    service_name,
    severity_text,
    scope,
    attributes,
    content='log',
    content_rowid='log_id'
);

CREATE TRIGGER IF NOT EXISTS log_ai AFTER INSERT ON log BEGIN
    INSERT INTO log_fts(rowid, body, service_name, severity_text, scope, attributes)
    VALUES (new.log_id, new.body, new.service_name, new.severity_text, new.scope, new.attributes);
END;

CREATE TRIGGER IF NOT EXISTS log_ad AFTER DELETE ON log BEGIN
    INSERT INTO log_fts(log_fts, rowid, body, service_name, severity_text, scope, attributes)
    VALUES ('delete', old.log_id, old.body, old.service_name, old.severity_text, old.scope, old.attributes);
END;
"#;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('log', 'resource_attributes', 'log_fts')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
