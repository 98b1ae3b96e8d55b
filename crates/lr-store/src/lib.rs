//! # lr-store — The "Vault" of LOGNROLL
//!
//! SQLite storage for log records: an FTS5 index over the text columns,
//! resource attribute documents stored once per digest, and the statements
//! `lr-core` builds executed with bound parameters.
//!
//! A single connection sits behind a mutex. Callers on an async runtime
//! should reach the store through `spawn_blocking`.

pub mod digest;
pub mod error;
mod query;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{LogStore, VacuumReport};
