//! Release model shared by hkdist and the hk client.
//!
//! A release is one built executable, identified by `(plat, cmd, ver)` and
//! the SHA-256 of its uncompressed bytes. The JSON shapes here are the wire
//! format of the hkdist REST API; byte fields travel as standard base64.

use crate::crypto::SHA256_LEN;
use crate::{HkError, ReleaseError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether `c` may appear in a command name or platform component
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// Whether `c` may appear in a version string
pub fn is_version_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// Validate a command name or platform string
pub fn validate_ident(ident: &str) -> Result<()> {
    if ident.is_empty() || !ident.chars().all(is_ident_char) {
        return Err(ReleaseError::InvalidIdent {
            ident: ident.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Validate a version string
pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || !version.chars().all(is_version_char) {
        return Err(ReleaseError::InvalidVersion {
            version: version.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Check a registered hash has the SHA-256 length
pub fn validate_sha256(hash: &[u8]) -> Result<()> {
    if hash.len() != SHA256_LEN {
        return Err(ReleaseError::BadHashLength {
            actual: hash.len(),
            expected: SHA256_LEN,
        }
        .into());
    }
    Ok(())
}

/// Target platform, written "os-arch" with Go-style names (linux-amd64, darwin-arm64)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    os: String,
    arch: String,
}

impl Platform {
    /// Create a platform from validated components
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Result<Self> {
        let os = os.into();
        let arch = arch.into();
        if os.contains('-') {
            return Err(ReleaseError::InvalidPlatform {
                platform: format!("{}-{}", os, arch),
            }
            .into());
        }
        validate_ident(&os)?;
        validate_ident(&arch)?;
        Ok(Self { os, arch })
    }

    /// The platform this binary was compiled for
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Guess a client's platform from its User-Agent header
    pub fn guess_from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        let os = if ua.contains("windows") {
            "windows"
        } else if ua.contains("mac os x") || ua.contains("darwin") {
            "darwin"
        } else {
            "linux"
        };
        let arch = if ua.contains("amd64") || ua.contains("x86_64") {
            "amd64"
        } else {
            "386"
        };
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = HkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((os, arch)) => Self::new(os, arch),
            None => Err(ReleaseError::InvalidPlatform {
                platform: s.to_string(),
            }
            .into()),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = HkError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.to_string()
    }
}

/// A registered release of one command on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    #[serde(rename = "Plat")]
    pub plat: Platform,
    #[serde(rename = "Cmd")]
    pub cmd: String,
    #[serde(rename = "Ver")]
    pub ver: String,
    #[serde(rename = "Sha256", with = "base64_bytes")]
    pub sha256: Vec<u8>,
}

impl Release {
    pub fn new(plat: Platform, cmd: impl Into<String>, ver: impl Into<String>, sha256: Vec<u8>) -> Result<Self> {
        let cmd = cmd.into();
        let ver = ver.into();
        validate_ident(&cmd)?;
        validate_version(&ver)?;
        validate_sha256(&sha256)?;
        Ok(Self { plat, cmd, ver, sha256 })
    }

    /// "{cmd}-{ver}-{plat}"
    pub fn name(&self) -> String {
        artifact_name(&self.cmd, &self.ver, &self.plat)
    }

    /// Object key of the gzipped executable in the dist store
    pub fn gz_name(&self) -> String {
        format!("{}.gz", self.name())
    }
}

/// "{cmd}-{ver}-{plat}", the artifact name of a build
pub fn artifact_name(cmd: &str, ver: &str, plat: &Platform) -> String {
    format!("{}-{}-{}", cmd, ver, plat)
}

/// Object key of a gzipped executable in the dist store
pub fn gz_key(cmd: &str, ver: &str, plat: &Platform) -> String {
    format!("{}.gz", artifact_name(cmd, ver, plat))
}

/// Body of `GET /{cmd}/current/{plat}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentInfo {
    #[serde(rename = "Version", alias = "version")]
    pub version: String,
    #[serde(rename = "Sha256", alias = "sha256", with = "base64_bytes")]
    pub sha256: Vec<u8>,
}

/// Body of `GET`/`PUT /{cmd}/{ver}/{plat}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashInfo {
    #[serde(rename = "sha256", alias = "Sha256", with = "base64_bytes")]
    pub sha256: Vec<u8>,
}

/// Body of `PUT /{cmd}/current/{plat}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Version", alias = "version")]
    pub version: String,
}

/// Body of `GET /{cmd}/{oldver}/next/{plat}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPatch {
    /// Version the patch produces
    #[serde(rename = "Version", alias = "version")]
    pub version: String,
    /// Hex SHA-1 of the hkdiff file, also its key in the patch store
    #[serde(rename = "Sha1", alias = "sha1")]
    pub sha1: String,
}

/// Serde adapter for byte strings encoded as standard base64
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ident() {
        assert!(validate_ident("hk").is_ok());
        assert!(validate_ident("linux-amd64").is_ok());
        assert!(validate_ident("").is_err());
        assert!(validate_ident("hk/../x").is_err());
        assert!(validate_ident("hk_1").is_err());
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("1").is_ok());
        assert!(validate_version("0.10.3").is_ok());
        assert!(validate_version("").is_err());
        assert!(validate_version("v1").is_err());
        assert!(validate_version("1.0-rc1").is_err());
    }

    #[test]
    fn test_platform_parse_and_display() {
        let plat: Platform = "linux-amd64".parse().unwrap();
        assert_eq!(plat.os(), "linux");
        assert_eq!(plat.arch(), "amd64");
        assert_eq!(plat.to_string(), "linux-amd64");

        assert!("linux".parse::<Platform>().is_err());
        assert!("-amd64".parse::<Platform>().is_err());
        assert!("linux-".parse::<Platform>().is_err());
        assert!("linux-am d64".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_guess_from_user_agent() {
        let cases = [
            ("hk/1 (darwin-amd64)", "darwin-amd64"),
            ("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_8_3)", "darwin-386"),
            ("curl/7.29.0 (x86_64-pc-linux-gnu)", "linux-amd64"),
            ("Mozilla/5.0 (Windows NT 6.1; WOW64)", "windows-386"),
            ("Mozilla/5.0 (Windows NT 10.0; Win64; x64) amd64", "windows-amd64"),
            ("", "linux-386"),
        ];
        for (ua, want) in cases {
            assert_eq!(Platform::guess_from_user_agent(ua).to_string(), want, "ua {:?}", ua);
        }
    }

    #[test]
    fn test_current_platform_is_valid() {
        let plat = Platform::current();
        let reparsed: Platform = plat.to_string().parse().unwrap();
        assert_eq!(plat, reparsed);
    }

    #[test]
    fn test_release_names() {
        let release = Release::new("linux-amd64".parse().unwrap(), "hk", "12", vec![7; 32]).unwrap();
        assert_eq!(release.name(), "hk-12-linux-amd64");
        assert_eq!(release.gz_name(), "hk-12-linux-amd64.gz");
    }

    #[test]
    fn test_release_rejects_short_hash() {
        let err = Release::new("linux-amd64".parse().unwrap(), "hk", "12", vec![7; 20]).unwrap_err();
        assert!(matches!(err, HkError::Release(ReleaseError::BadHashLength { actual: 20, .. })));
    }

    #[test]
    fn test_release_json_wire_names() {
        let release = Release::new("darwin-amd64".parse().unwrap(), "hk", "3", vec![0; 32]).unwrap();
        let json = serde_json::to_value(&release).unwrap();
        assert_eq!(json["Plat"], "darwin-amd64");
        assert_eq!(json["Cmd"], "hk");
        assert_eq!(json["Ver"], "3");
        assert_eq!(json["Sha256"], "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
    }

    #[test]
    fn test_hash_info_accepts_both_casings() {
        let lower: HashInfo = serde_json::from_str(r#"{"sha256":"AQID"}"#).unwrap();
        let upper: HashInfo = serde_json::from_str(r#"{"Sha256":"AQID"}"#).unwrap();
        assert_eq!(lower.sha256, vec![1, 2, 3]);
        assert_eq!(lower, upper);
        assert!(serde_json::from_str::<HashInfo>(r#"{"sha256":"not base64!"}"#).is_err());
    }

    #[test]
    fn test_version_info_body() {
        let info: VersionInfo = serde_json::from_str(r#"{"Version":"4"}"#).unwrap();
        assert_eq!(info.version, "4");
        assert_eq!(serde_json::to_string(&info).unwrap(), r#"{"Version":"4"}"#);
    }
}
