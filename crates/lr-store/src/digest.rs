//! Content addressing for resource attribute documents.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of the canonical JSON text of `doc`.
///
/// `serde_json` keeps object keys sorted unless `preserve_order` is enabled,
/// so equal documents always serialize to the same text.
pub fn resource_digest(doc: &serde_json::Value) -> String {
    let canonical = doc.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}
