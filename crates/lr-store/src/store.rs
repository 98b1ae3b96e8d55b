//! # Log Store
//!
//! [`LogStore`] owns the connection: opening and schema setup, batched
//! ingestion, and the vacuum that expires and compacts. Reads live in the
//! `query` module.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use lr_core::NewLogRecord;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::digest::resource_digest;
use crate::error::{Result, StoreError};
use crate::schema;

/// Log storage over one SQLite connection.
pub struct LogStore {
    pub(crate) conn: Mutex<Connection>,
}

/// Outcome of a completed [`LogStore::vacuum`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VacuumReport {
    /// Logs removed for falling outside the retention window.
    pub expired_logs: usize,
    /// Resource attribute sets no longer referenced by any log.
    pub pruned_resources: usize,
    pub elapsed: Duration,
}

impl LogStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch(schema::FILE_PRAGMAS)?;
        schema::initialize(&conn)?;
        info!(path = %path.display(), "Opened log store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append records in one transaction.
    pub fn add_all(&self, records: &[NewLogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut insert_resource = tx.prepare(
                "INSERT OR IGNORE INTO resource_attributes (digest, resource_attributes) VALUES (?1, ?2)",
            )?;
            let mut insert_log = tx.prepare(
                "INSERT INTO log (timestamp, observed_timestamp, severity_text, severity_number, \
                 service_name, scope, body, trace_id, span_id, trace_flags, attributes, \
                 resource_attributes_digest) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;

            for record in records {
                let digest = resource_digest(&record.resource_attributes);
                insert_resource.execute(params![
                    digest,
                    serde_json::to_string(&record.resource_attributes)?
                ])?;
                insert_log.execute(params![
                    record.timestamp.timestamp_millis(),
                    record.observed_timestamp.timestamp_millis(),
                    record.severity_text,
                    record.severity_number,
                    record.service_name,
                    record.scope,
                    record.body,
                    record.trace_id,
                    record.span_id,
                    record.trace_flags,
                    serde_json::to_string(&record.attributes)?,
                    digest,
                ])?;
            }
        }
        tx.commit()?;

        debug!(count = records.len(), "Stored log records");
        Ok(())
    }

    /// Remove every log and resource attribute set.
    pub fn clear(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM log", [])?;
        tx.execute("DELETE FROM resource_attributes", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Expire old logs, drop orphaned resource sets, optimize the full-text
    /// index and compact the file.
    ///
    /// Holds the connection for the whole run; concurrent store calls wait.
    pub fn vacuum(&self, retention: Option<Duration>) -> Result<VacuumReport> {
        let started = Instant::now();
        let conn = self.conn.lock();

        let expired_logs = match retention {
            Some(retention) => {
                let retention = chrono::Duration::from_std(retention)
                    .map_err(|e| StoreError::Vacuum(format!("invalid retention: {}", e)))?;
                let cutoff = (Utc::now() - retention).timestamp_millis();
                conn.execute("DELETE FROM log WHERE observed_timestamp < ?1", [cutoff])
                    .map_err(|e| vacuum_step("expire logs", e))?
            }
            None => 0,
        };

        let pruned_resources = conn
            .execute(
                "DELETE FROM resource_attributes WHERE digest NOT IN \
                 (SELECT DISTINCT resource_attributes_digest FROM log)",
                [],
            )
            .map_err(|e| vacuum_step("prune resource attributes", e))?;

        conn.execute("INSERT INTO log_fts(log_fts) VALUES ('optimize')", [])
            .map_err(|e| vacuum_step("optimize index", e))?;

        conn.execute_batch("VACUUM")
            .map_err(|e| vacuum_step("vacuum", e))?;

        Ok(VacuumReport {
            expired_logs,
            pruned_resources,
            elapsed: started.elapsed(),
        })
    }
}

fn vacuum_step(step: &str, e: rusqlite::Error) -> StoreError {
    StoreError::Vacuum(format!("{}: {}", step, e))
}
