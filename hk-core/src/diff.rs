//! The hkdiff patch format.
//!
//! An hkdiff file is a fixed 68 byte header followed by a BSDIFF40 payload:
//!
//! ```text
//! magic "hkDIFF01" | sha1(old) | sha1(new) | sha1(payload) | bsdiff payload
//!      8 bytes       20 bytes    20 bytes      20 bytes
//! ```
//!
//! The hashes let a client check it holds the right base binary before
//! patching and confirm the patch reproduced the intended executable.

use crate::crypto::{SHA1_LEN, secure_compare_bytes, sha1_digest, sha1_hex};
use crate::{PatchError, Result};
use qbsdiff::{Bsdiff, Bspatch};

/// Leading bytes of every hkdiff file
pub const MAGIC: [u8; 8] = *b"hkDIFF01";

/// Size of the encoded header
pub const HEADER_LEN: usize = MAGIC.len() + 3 * SHA1_LEN;

const MAX_PREALLOC_SLACK: u64 = 1 << 20;

/// Decoded hkdiff header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHeader {
    pub old_sha1: [u8; SHA1_LEN],
    pub new_sha1: [u8; SHA1_LEN],
    pub diff_sha1: [u8; SHA1_LEN],
}

impl PatchHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(&MAGIC);
        out[8..28].copy_from_slice(&self.old_sha1);
        out[28..48].copy_from_slice(&self.new_sha1);
        out[48..68].copy_from_slice(&self.diff_sha1);
        out
    }

    /// Split an hkdiff file into its header and bsdiff payload
    pub fn decode(hkdiff: &[u8]) -> Result<(Self, &[u8])> {
        if hkdiff.len() < HEADER_LEN {
            if hkdiff.len() >= MAGIC.len() && hkdiff[..MAGIC.len()] != MAGIC {
                return Err(PatchError::BadMagic.into());
            }
            return Err(PatchError::Truncated { len: hkdiff.len() }.into());
        }
        if hkdiff[..MAGIC.len()] != MAGIC {
            return Err(PatchError::BadMagic.into());
        }

        let mut header = Self {
            old_sha1: [0; SHA1_LEN],
            new_sha1: [0; SHA1_LEN],
            diff_sha1: [0; SHA1_LEN],
        };
        header.old_sha1.copy_from_slice(&hkdiff[8..28]);
        header.new_sha1.copy_from_slice(&hkdiff[28..48]);
        header.diff_sha1.copy_from_slice(&hkdiff[48..68]);
        Ok((header, &hkdiff[HEADER_LEN..]))
    }
}

/// A generated hkdiff file
#[derive(Debug, Clone)]
pub struct DiffResult {
    pub header: PatchHeader,
    /// The complete hkdiff file, header included
    pub data: Vec<u8>,
    pub old_size: u64,
    pub new_size: u64,
}

impl DiffResult {
    /// Hex SHA-1 of the whole file, its content address in the patch store
    pub fn sha1_hex(&self) -> String {
        sha1_hex(&self.data)
    }

    pub fn patch_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn summary(&self) -> String {
        format!(
            "hkdiff {} -> {} bytes, patch {} bytes",
            self.old_size,
            self.new_size,
            self.patch_size()
        )
    }
}

/// Builds and applies hkdiff patches
#[derive(Debug, Default)]
pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the hkdiff turning `old` into `new`
    pub fn create_patch(&self, old: &[u8], new: &[u8]) -> Result<DiffResult> {
        let mut payload = Vec::new();
        Bsdiff::new(old, new)
            .compare(&mut payload)
            .map_err(|e| PatchError::DiffFailed {
                message: e.to_string(),
            })?;

        let header = PatchHeader {
            old_sha1: sha1_digest(old),
            new_sha1: sha1_digest(new),
            diff_sha1: sha1_digest(&payload),
        };

        let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
        data.extend_from_slice(&header.encode());
        data.extend_from_slice(&payload);

        Ok(DiffResult {
            header,
            data,
            old_size: old.len() as u64,
            new_size: new.len() as u64,
        })
    }

    /// Apply an hkdiff to `old`, checking every header hash
    pub fn apply_patch(&self, old: &[u8], hkdiff: &[u8]) -> Result<Vec<u8>> {
        let (header, payload) = PatchHeader::decode(hkdiff)?;

        let old_sha1 = sha1_digest(old);
        if !secure_compare_bytes(&old_sha1, &header.old_sha1) {
            return Err(PatchError::hash_mismatch("old", &header.old_sha1, &old_sha1).into());
        }

        let diff_sha1 = sha1_digest(payload);
        if !secure_compare_bytes(&diff_sha1, &header.diff_sha1) {
            return Err(PatchError::hash_mismatch("diff", &header.diff_sha1, &diff_sha1).into());
        }

        let patcher = Bspatch::new(payload).map_err(|e| PatchError::ApplyFailed {
            message: e.to_string(),
        })?;
        // The claimed size comes from the payload and only bounds the preallocation
        let claimed = patcher.hint_target_size();
        let capacity = claimed.min(old.len() as u64 * 4 + MAX_PREALLOC_SLACK);
        let mut new = Vec::with_capacity(capacity as usize);
        patcher
            .apply(old, &mut new)
            .map_err(|e| PatchError::ApplyFailed {
                message: e.to_string(),
            })?;
        if new.len() as u64 != claimed {
            return Err(PatchError::ApplyFailed {
                message: format!("patched size {} != claimed {}", new.len(), claimed),
            }
            .into());
        }

        let new_sha1 = sha1_digest(&new);
        if !secure_compare_bytes(&new_sha1, &header.new_sha1) {
            return Err(PatchError::hash_mismatch("new", &header.new_sha1, &new_sha1).into());
        }

        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HkError;

    fn binaries() -> (Vec<u8>, Vec<u8>) {
        let old: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut new = old.clone();
        new[100..140].copy_from_slice(&[0xAA; 40]);
        new.extend_from_slice(b"appended section of the new release");
        (old, new)
    }

    #[test]
    fn test_create_and_apply() {
        let (old, new) = binaries();
        let engine = DiffEngine::new();

        let result = engine.create_patch(&old, &new).unwrap();
        assert_eq!(&result.data[..8], b"hkDIFF01");
        assert_eq!(result.header.old_sha1, sha1_digest(&old));
        assert_eq!(result.header.new_sha1, sha1_digest(&new));
        assert_eq!(result.sha1_hex().len(), 40);

        let patched = engine.apply_patch(&old, &result.data).unwrap();
        assert_eq!(patched, new);
    }

    #[test]
    fn test_header_layout() {
        let header = PatchHeader {
            old_sha1: [1; 20],
            new_sha1: [2; 20],
            diff_sha1: [3; 20],
        };
        let encoded = header.encode();
        assert_eq!(encoded.len(), 68);
        assert_eq!(&encoded[8..28], &[1; 20]);
        assert_eq!(&encoded[48..68], &[3; 20]);

        let (decoded, payload) = PatchHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let (old, new) = binaries();
        let mut data = DiffEngine::new().create_patch(&old, &new).unwrap().data;
        data[0] = b'X';
        let err = DiffEngine::new().apply_patch(&old, &data).unwrap_err();
        assert!(matches!(err, HkError::Patch(PatchError::BadMagic)));
    }

    #[test]
    fn test_rejects_truncated() {
        let err = DiffEngine::new().apply_patch(b"old", b"hkDIFF01short").unwrap_err();
        assert!(matches!(err, HkError::Patch(PatchError::Truncated { len: 13 })));
    }

    #[test]
    fn test_rejects_wrong_base() {
        let (old, new) = binaries();
        let data = DiffEngine::new().create_patch(&old, &new).unwrap().data;
        let err = DiffEngine::new().apply_patch(b"some other binary", &data).unwrap_err();
        assert!(matches!(err, HkError::Patch(PatchError::HashMismatch { which: "old", .. })));
    }

    #[test]
    fn test_rejects_corrupt_payload() {
        let (old, new) = binaries();
        let mut data = DiffEngine::new().create_patch(&old, &new).unwrap().data;
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let err = DiffEngine::new().apply_patch(&old, &data).unwrap_err();
        assert!(matches!(err, HkError::Patch(PatchError::HashMismatch { which: "diff", .. })));
    }

    #[test]
    fn test_rejects_wrong_target_hash() {
        let (old, new) = binaries();
        let mut data = DiffEngine::new().create_patch(&old, &new).unwrap().data;
        data[30] ^= 0xFF;
        let err = DiffEngine::new().apply_patch(&old, &data).unwrap_err();
        assert!(matches!(err, HkError::Patch(PatchError::HashMismatch { which: "new", .. })));
    }

    #[test]
    fn test_rejects_forged_target_size() {
        let (old, new) = binaries();
        let mut payload = Vec::new();
        Bsdiff::new(&old, &new).compare(&mut payload).unwrap();
        // BSDIFF40 header: magic, control length, diff length, new size
        payload[24..32].copy_from_slice(&i64::MAX.to_le_bytes());

        let header = PatchHeader {
            old_sha1: sha1_digest(&old),
            new_sha1: sha1_digest(&new),
            diff_sha1: sha1_digest(&payload),
        };
        let mut data = header.encode().to_vec();
        data.extend_from_slice(&payload);

        let err = DiffEngine::new().apply_patch(&old, &data).unwrap_err();
        assert!(matches!(err, HkError::Patch(PatchError::ApplyFailed { .. })));
    }
}
