//! Integration tests for the distribution pipeline pieces in hk-core
//!
//! These tests walk a release from build output through storage, patching and
//! verification the way hkdist and the hk client use them together.

#[cfg(test)]
mod tests {
    use crate::{
        gunzip, gz_key, gzip_named, secure_compare_bytes, sha1_hex, sha256_digest, DiffEngine,
        FilesystemStorage, LogContext, ObjectStore, Platform, Release, Result,
    };
    use tempfile::TempDir;

    fn fake_binary(version: u8, len: usize) -> Vec<u8> {
        let mut data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        for chunk in data.chunks_mut(997) {
            chunk[0] = version;
        }
        data
    }

    #[tokio::test]
    async fn test_release_store_patch_verify() -> Result<()> {
        let context = LogContext::new("integration_test", "test");
        context.info("Starting release pipeline test");

        let temp_dir = TempDir::new()?;
        let dist = FilesystemStorage::new(temp_dir.path().join("dist"))?;
        let patches = FilesystemStorage::new(temp_dir.path().join("patch"))?;
        let plat: Platform = "linux-amd64".parse()?;

        let old_bin = fake_binary(1, 64 * 1024);
        let new_bin = fake_binary(2, 66 * 1024);

        // Build side: hash, gzip and upload each version
        let mut releases = Vec::new();
        for (ver, bin) in [("1", &old_bin), ("2", &new_bin)] {
            let release = Release::new(plat.clone(), "hk", ver, sha256_digest(bin).to_vec())?;
            let (gz, stats) = gzip_named(bin, &format!("hk-{}", ver))?;
            assert!(stats.compressed_size < stats.original_size);
            dist.put(&release.gz_name(), gz).await?;
            releases.push(release);
        }

        // Generator side: fetch both, diff, store content-addressed
        let old = gunzip(&dist.get(&gz_key("hk", "1", &plat)).await?)?;
        let new = gunzip(&dist.get(&gz_key("hk", "2", &plat)).await?)?;
        let diff = DiffEngine::new().create_patch(&old, &new)?;
        assert!(diff.patch_size() < new.len() as u64);
        let key = diff.sha1_hex();
        patches.put(&key, diff.data.clone()).await?;

        // Client side: fetch the patch, apply, verify the advertised hash
        let hkdiff = patches.get(&key).await?;
        assert_eq!(sha1_hex(&hkdiff), key);
        let patched = DiffEngine::new().apply_patch(&old_bin, &hkdiff)?;
        assert!(secure_compare_bytes(&sha256_digest(&patched), &releases[1].sha256));
        assert!(!secure_compare_bytes(&sha256_digest(&old_bin), &releases[1].sha256));

        context.info("Release pipeline test completed successfully");
        Ok(())
    }

    #[test]
    fn test_patch_chain_applies_in_order() -> Result<()> {
        let engine = DiffEngine::new();
        let v1 = fake_binary(1, 8 * 1024);
        let v2 = fake_binary(2, 9 * 1024);
        let v3 = fake_binary(3, 7 * 1024);

        let p12 = engine.create_patch(&v1, &v2)?;
        let p23 = engine.create_patch(&v2, &v3)?;

        let mid = engine.apply_patch(&v1, &p12.data)?;
        let end = engine.apply_patch(&mid, &p23.data)?;
        assert_eq!(end, v3);

        // Skipping a hop is caught by the base hash
        assert!(engine.apply_patch(&v1, &p23.data).is_err());
        Ok(())
    }
}
