use thiserror::Error;

pub type Result<T> = std::result::Result<T, HkError>;

#[derive(Debug, Error)]
pub enum HkError {
    #[error("Release error: {0}")]
    Release(#[from] ReleaseError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input or downloaded data failed a check
    #[error("{message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Release naming and artifact errors
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Command or platform name outside [A-Za-z0-9-]
    #[error("Bad identifier: {ident:?}")]
    InvalidIdent { ident: String },

    /// Version outside [0-9.]
    #[error("Invalid version: {version:?}")]
    InvalidVersion { version: String },

    /// Platform is not "os-arch"
    #[error("Invalid platform: {platform:?}")]
    InvalidPlatform { platform: String },

    #[error("Bad hash length {actual} != {expected}")]
    BadHashLength { actual: usize, expected: usize },

    /// Writing or reading a .gz artifact failed
    #[error("gzip: {message}")]
    Gzip { message: String },
}

/// hkdiff patch errors
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Bad patch magic")]
    BadMagic,

    #[error("Patch truncated: {len} bytes")]
    Truncated { len: usize },

    /// `which` is old, new or diff
    #[error("{which} hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        which: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Diff failed: {message}")]
    DiffFailed { message: String },

    #[error("Apply failed: {message}")]
    ApplyFailed { message: String },
}

/// Errors talking to hkdist or the artifact buckets
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Non-success status other than 404 and 409
    #[error("{url}: unexpected status {status}: {body}")]
    Status { status: u16, url: String, body: String },

    /// The request never produced a response, or the body could not be read
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Conflict: {resource}")]
    Conflict { resource: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {path}")]
    NotFound { path: String },

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Storage backend error: {backend} - {message}")]
    Backend { backend: String, message: String },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("netrc parse error at token {token}: {message}")]
    NetrcParse { token: usize, message: String },
}

impl HkError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The remote resource or stored object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HkError::Network(NetworkError::NotFound { .. })
                | HkError::Storage(StorageError::NotFound { .. })
        )
    }
}

impl ReleaseError {
    pub fn gzip(error: impl std::fmt::Display) -> Self {
        Self::Gzip {
            message: error.to_string(),
        }
    }
}

impl PatchError {
    /// Digests are shown as hex
    pub fn hash_mismatch(which: &'static str, expected: &[u8], actual: &[u8]) -> Self {
        Self::HashMismatch {
            which,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        }
    }
}

impl NetworkError {
    pub fn transport(url: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: error.to_string(),
        }
    }
}

impl StorageError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: error.to_string(),
            },
            _ => Self::Io {
                message: error.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for HkError {
    fn from(error: serde_json::Error) -> Self {
        HkError::internal(format!("json: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_errors_wrap() {
        let err: HkError = ReleaseError::InvalidVersion {
            version: "v1".to_string(),
        }
        .into();
        assert!(matches!(err, HkError::Release(ReleaseError::InvalidVersion { .. })));
        assert_eq!(err.to_string(), "Release error: Invalid version: \"v1\"");
    }

    #[test]
    fn test_validation_message_is_bare() {
        let err = HkError::validation("new file hash mismatch after patch");
        assert_eq!(err.to_string(), "new file hash mismatch after patch");
    }

    #[test]
    fn test_hash_mismatch_is_hex() {
        let err = PatchError::hash_mismatch("old", &[0xab, 0xcd], &[0x01]);
        assert_eq!(err.to_string(), "old hash mismatch: expected abcd, got 01");
    }

    #[test]
    fn test_is_not_found() {
        let err: HkError = NetworkError::NotFound {
            resource: "hk/current/linux-amd64".to_string(),
        }
        .into();
        assert!(err.is_not_found());

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "hk-1-linux-amd64.gz");
        assert!(HkError::Storage(missing.into()).is_not_found());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "dist");
        assert!(!HkError::Storage(denied.into()).is_not_found());
        assert!(!HkError::internal("boom").is_not_found());
    }
}
