//! Borderless tables for command output.

use hk_core::Release;
use tabled::{Table, Tabled, settings::Style};

/// Hex digits of the hash shown in listings
const HASH_PREFIX: usize = 12;

#[derive(Debug, Tabled)]
pub struct ReleaseRow {
    #[tabled(rename = "PLAT")]
    pub plat: String,
    #[tabled(rename = "CMD")]
    pub cmd: String,
    #[tabled(rename = "VER")]
    pub ver: String,
    #[tabled(rename = "SHA256")]
    pub sha256: String,
}

impl From<&Release> for ReleaseRow {
    fn from(release: &Release) -> Self {
        let mut sha256 = hex::encode(&release.sha256);
        sha256.truncate(HASH_PREFIX);
        Self {
            plat: release.plat.to_string(),
            cmd: release.cmd.clone(),
            ver: release.ver.clone(),
            sha256,
        }
    }
}

/// Releases matching the optional filters, in catalogue order
pub fn filter_releases<'a>(
    releases: &'a [Release],
    cmd: Option<&str>,
    plat: Option<&str>,
) -> Vec<&'a Release> {
    releases
        .iter()
        .filter(|r| cmd.is_none_or(|cmd| r.cmd == cmd))
        .filter(|r| plat.is_none_or(|plat| r.plat.to_string() == plat))
        .collect()
}

pub fn release_table(releases: &[&Release]) -> String {
    let rows = releases.iter().map(|r| ReleaseRow::from(*r));
    let mut table = Table::new(rows);
    table.with(Style::blank());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(plat: &str, ver: &str) -> Release {
        Release::new(plat.parse().unwrap(), "hk", ver, vec![0xab; 32]).unwrap()
    }

    #[test]
    fn test_release_table() {
        let releases = vec![release("linux-amd64", "1"), release("darwin-amd64", "10")];
        let refs: Vec<&Release> = releases.iter().collect();
        let table = release_table(&refs);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("PLAT") && lines[0].contains("SHA256"));
        assert!(lines[1].contains("linux-amd64") && lines[1].contains("abababababab"));
        assert!(!lines[1].contains("ab".repeat(7).as_str()));
        assert!(!table.contains('|'));
    }

    #[test]
    fn test_filter_releases() {
        let releases = vec![
            release("linux-amd64", "1"),
            release("darwin-amd64", "1"),
            release("linux-amd64", "2"),
        ];
        assert_eq!(filter_releases(&releases, None, None).len(), 3);
        assert_eq!(filter_releases(&releases, Some("hk"), Some("linux-amd64")).len(), 2);
        assert!(filter_releases(&releases, Some("hkdist"), None).is_empty());
    }
}
