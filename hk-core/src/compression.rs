//! gzip handling for release artifacts.
//!
//! Executables are published as `<cmd>-<ver>-<plat>.gz`, compressed at the
//! best level with the versioned name recorded in the gzip header.

use crate::{ReleaseError, Result};
use flate2::{Compression, GzBuilder, read::GzDecoder};
use std::io::{Read, Write};

/// Sizes reported after compressing an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipStats {
    pub original_size: u64,
    pub compressed_size: u64,
}

impl GzipStats {
    /// Percentage of the original size saved, zero when the output grew
    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        let saved = self.original_size.saturating_sub(self.compressed_size);
        saved as f64 * 100.0 / self.original_size as f64
    }
}

/// Gzip `data` at best compression with `name` in the header
pub fn gzip_named(data: &[u8], name: &str) -> Result<(Vec<u8>, GzipStats)> {
    let mut encoder = GzBuilder::new()
        .filename(name.as_bytes())
        .write(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder.write_all(data).map_err(ReleaseError::gzip)?;
    let gz = encoder.finish().map_err(ReleaseError::gzip)?;

    let stats = GzipStats {
        original_size: data.len() as u64,
        compressed_size: gz.len() as u64,
    };
    Ok((gz, stats))
}

/// Decompress a complete gzip member
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(ReleaseError::gzip)?;
    Ok(out)
}
