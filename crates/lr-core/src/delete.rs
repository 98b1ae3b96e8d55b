//! Batched deletion of resolved row ids.
//!
//! The caller owns the transaction: it resolves the ids and runs every batch
//! inside one unit of work, so an error from any batch aborts the whole
//! delete.

/// Upper bound on ids bound into a single `DELETE ... IN (...)`.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Feed `ids` to `delete_batch` in chunks of at most `batch_size`, summing
/// the affected row counts. Stops at the first error.
pub fn delete_in_batches<E, F>(ids: &[i64], batch_size: usize, mut delete_batch: F) -> Result<usize, E>
where
    F: FnMut(&[i64]) -> Result<usize, E>,
{
    let mut deleted = 0;
    for chunk in ids.chunks(batch_size.max(1)) {
        deleted += delete_batch(chunk)?;
    }
    Ok(deleted)
}

/// `DELETE FROM log WHERE log_id IN (?, ?, ...)` for `n` ids.
pub fn delete_statement(n: usize) -> String {
    let placeholders = vec!["?"; n].join(", ");
    format!("DELETE FROM log WHERE log_id IN ({})", placeholders)
}
