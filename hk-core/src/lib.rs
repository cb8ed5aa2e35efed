pub mod error;
pub mod logging;
pub mod crypto;
pub mod compression;
pub mod release;
pub mod diff;
pub mod storage;
pub mod netrc;
pub mod client;

pub use error::{Result, HkError, ReleaseError, PatchError, NetworkError, StorageError, AuthError};
pub use logging::{LogConfig, LogContext, CorrelationId, init_logging, init_cli_logging, init_server_logging, LogFormat};
pub use compression::{GzipStats, gzip_named, gunzip};
pub use crypto::{SHA1_LEN, SHA256_LEN, secure_compare_bytes, sha1_digest, sha1_hex, sha256_digest};
pub use release::{
    Platform, Release, CurrentInfo, HashInfo, VersionInfo, NextPatch,
    validate_ident, validate_version, validate_sha256, artifact_name, gz_key,
};
pub use diff::{DiffEngine, DiffResult, PatchHeader};
pub use storage::{ObjectStore, FilesystemStorage, S3Storage, StorageConfig, open_store};
pub use netrc::{Netrc, Machine, Credentials, credentials_for_url, lookup_credentials, netrc_path};
pub use client::{DistClient, ReleaseList};

#[cfg(test)]
mod integration_tests;
