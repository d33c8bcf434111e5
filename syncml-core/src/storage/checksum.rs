//! Note content checksums
//!
//! SHA-256 digests of note bodies, used to tell real edits from rewrites of
//! identical content.

use ring::digest::{Context, SHA256};

/// Compute SHA-256 checksum of content
///
/// # Returns
/// Checksum string in format "sha256:hexstring"
///
/// # Example
/// ```
/// use syncml_core::storage::checksum::compute_checksum;
///
/// let checksum = compute_checksum(b"hello world");
/// assert!(checksum.starts_with("sha256:"));
/// ```
pub fn compute_checksum(data: &[u8]) -> String {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    format!("sha256:{}", hex::encode(digest.as_ref()))
}

/// True when `data` hashes to `checksum`.
pub fn matches_checksum(data: &[u8], checksum: &str) -> bool {
    compute_checksum(data) == checksum
}
