//! Content fingerprinting utilities
//!
//! SHA-256 based fingerprints used for two purposes: detecting re-uploaded
//! remote files in the ledger, and deriving stable record identities when the
//! source provides no transaction number.

use sha2::{Digest, Sha256};

/// Compute the hex-encoded SHA-256 digest of a byte slice
pub fn fingerprint_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute a fingerprint over an ordered set of string fields
///
/// Fields are length-prefixed before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` produce different digests.
pub fn fingerprint_fields<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_bytes_known_value() {
        let digest = fingerprint_bytes(b"hello world");
        assert_eq!(digest, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_fingerprint_bytes_is_deterministic() {
        assert_eq!(fingerprint_bytes(b"abc"), fingerprint_bytes(b"abc"));
        assert_ne!(fingerprint_bytes(b"abc"), fingerprint_bytes(b"abd"));
    }

    #[test]
    fn test_fingerprint_fields_boundary_sensitivity() {
        let a = fingerprint_fields(["ab", "c"]);
        let b = fingerprint_fields(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_fields_is_order_sensitive() {
        let a = fingerprint_fields(["tank1", "100.0"]);
        let b = fingerprint_fields(["100.0", "tank1"]);
        assert_ne!(a, b);
    }
}
