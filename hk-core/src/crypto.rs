//! Digests used to identify executables and patches.
//!
//! Releases are keyed by the SHA-256 of the uncompressed executable. hkdiff
//! patches carry SHA-1 digests of both ends and of themselves.

use sha1::Sha1;
use sha2::{Digest, Sha256};

pub const SHA256_LEN: usize = 32;
pub const SHA1_LEN: usize = 20;

pub fn sha256_digest(data: &[u8]) -> [u8; SHA256_LEN] {
    Sha256::digest(data).into()
}

pub fn sha1_digest(data: &[u8]) -> [u8; SHA1_LEN] {
    Sha1::digest(data).into()
}

/// Lowercase hex SHA-1, the key patches are stored under
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(sha1_digest(data))
}

/// Constant-time digest comparison; slices of different length never match
pub fn secure_compare_bytes(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(subtle::ConstantTimeEq::ct_eq(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            hex::encode(sha256_digest(b"hello world")),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(sha1_hex(b"hello world"), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(sha1_digest(b"").len(), SHA1_LEN);
    }

    #[test]
    fn test_secure_compare_bytes() {
        let digest = sha256_digest(b"hk");
        assert!(secure_compare_bytes(&digest, &sha256_digest(b"hk")));
        assert!(!secure_compare_bytes(&digest, &sha256_digest(b"hk2")));
        assert!(!secure_compare_bytes(&digest, &digest[..SHA1_LEN]));
        assert!(secure_compare_bytes(&[], &[]));
    }
}
