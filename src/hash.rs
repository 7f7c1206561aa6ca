//! Content hashing and result identity hashing (§3, §4.11).
//!
//! A 128-bit BLAKE2b digest is used both for file content hashes (change
//! detection) and for the stable per-result identifier.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};

type Blake2b128 = Blake2b<U16>;

/// Hex-encoded 128-bit BLAKE2b digest of arbitrary bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Blake2b128::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Result id: BLAKE2b over `rel_path | line_start | line_end | file_content_hash` (§4.11).
pub fn result_id(rel_path: &str, line_start: u32, line_end: u32, file_content_hash: &str) -> String {
    let mut hasher = Blake2b128::new();
    hasher.update(rel_path.as_bytes());
    hasher.update(b"|");
    hasher.update(line_start.to_le_bytes());
    hasher.update(b"|");
    hasher.update(line_end.to_le_bytes());
    hasher.update(b"|");
    hasher.update(file_content_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Minimal hex encoder, avoiding a dependency on the `hex` crate.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let mut s = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bytes_is_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
    }

    #[test]
    fn hash_bytes_differs_on_content_change() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"hellx"));
    }

    #[test]
    fn result_id_stable_for_same_inputs() {
        let a = result_id("src/a.rs", 1, 10, "abc123");
        let b = result_id("src/a.rs", 1, 10, "abc123");
        assert_eq!(a, b);
    }

    #[test]
    fn result_id_changes_with_content_hash() {
        let a = result_id("src/a.rs", 1, 10, "abc123");
        let b = result_id("src/a.rs", 1, 10, "def456");
        assert_ne!(a, b);
    }

    #[test]
    fn result_id_unaffected_by_unrelated_files() {
        // Same file, same span, same content hash -> same id regardless of
        // what else happens to the corpus (§8: result-id stability).
        let a = result_id("src/a.rs", 1, 10, "abc123");
        let b = result_id("src/a.rs", 1, 10, "abc123");
        assert_eq!(a, b);
    }
}
