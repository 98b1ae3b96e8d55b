//! # lr-core — The "Engine" of LOGNROLL
//!
//! Everything in this crate is pure: it turns search requests into SQL text
//! plus bound parameters, folds severity rows into volume buckets, and
//! arbitrates maintenance mode against background vacuums. Storage and
//! transport live in `lr-store` and `lr-hub`.
//!
//! - [`query`] — the free-text query language and its full-text predicate compiler.
//! - [`filter`] — structured filter expressions compiled to SQL fragments.
//! - [`cursor`] — the opaque keyset pagination cursor.
//! - [`search`] — the shared WHERE-clause builder for list/count/volume/delete.
//! - [`volume`] — severity canonicalization and per-bucket merging.
//! - [`delete`] — bounded batching for bulk deletes.
//! - [`maintenance`] — the maintenance/vacuum state machine.

pub mod cursor;
pub mod delete;
pub mod error;
pub mod filter;
pub mod maintenance;
pub mod query;
pub mod record;
pub mod search;
pub mod volume;

pub use cursor::{Cursor, PageToken};
pub use error::{CoreError, Result};
pub use maintenance::{MaintenanceMode, MaintenanceStatus, Phase, VacuumGuard};
pub use record::{LogRecord, NewLogRecord};
pub use search::{SearchQuery, SearchRequest, SqlParam};
pub use volume::{Severity, SeverityCount, Volume};
