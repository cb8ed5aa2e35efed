//! Self-update: current-version discovery, patch chains and the background check.

use crate::config::Config;
use anyhow::{Context, bail};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hk_core::{
    DiffEngine, DistClient, HkError, PatchError, Platform, Result, gz_key, secure_compare_bytes,
    sha1_digest, sha256_digest, validate_sha256,
};
use rand::Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Version baked in at build time; `dev` builds never update
pub const VERSION: &str = match option_env!("HK_VERSION") {
    Some(version) => version,
    None => "dev",
};

pub const DEV_VERSION: &str = "dev";

/// Longest patch chain followed before falling back to a full download
pub const MAX_PATCH_HOPS: usize = 16;

const CMD_NAME: &str = "hk";
const CKTIME: &str = "cktime";

/// What an update run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    Updated { version: String },
}

pub struct Updater {
    client: DistClient,
    bin_url: String,
    cmd: String,
    plat: Platform,
    version: String,
}

impl Updater {
    pub fn new(config: &Config) -> Result<Self> {
        let user_agent = format!("{}/{} ({})", CMD_NAME, VERSION, Platform::current());
        let client = DistClient::new(&config.dist.url, &user_agent, config.dist.timeout())?;
        Ok(Self::with_client(
            client,
            &config.dist.bin_url,
            Platform::current(),
            VERSION,
        ))
    }

    pub fn with_client(client: DistClient, bin_url: &str, plat: Platform, version: &str) -> Self {
        Self {
            client,
            bin_url: bin_url.trim_end_matches('/').to_string(),
            cmd: CMD_NAME.to_string(),
            plat,
            version: version.to_string(),
        }
    }

    /// Replace the running executable with the current release
    pub async fn update(&self) -> anyhow::Result<UpdateOutcome> {
        if self.version == DEV_VERSION {
            bail!("Dev builds don't support auto-updates");
        }

        let exe = std::env::current_exe().context("locating the running executable")?;
        let old = tokio::fs::read(&exe)
            .await
            .with_context(|| format!("reading {}", exe.display()))?;

        match self.fetch_update(&old).await? {
            None => Ok(UpdateOutcome::UpToDate),
            Some((version, bin)) => {
                install(&exe, &bin)?;
                info!(from = %self.version, to = %version, "Updated");
                Ok(UpdateOutcome::Updated { version })
            }
        }
    }

    /// The current release's executable, or `None` if `old` is already current
    pub async fn fetch_update(&self, old: &[u8]) -> Result<Option<(String, Vec<u8>)>> {
        let info = self.client.current_info(&self.cmd, &self.plat).await?;
        validate_sha256(&info.sha256)?;
        if info.version == self.version {
            return Ok(None);
        }

        let bin = match self.follow_patches(old, &info.version).await {
            Ok(bin) => bin,
            Err(e) => {
                debug!(error = %e, "Patch chain failed, downloading full executable");
                self.fetch_full(&info.version).await?
            }
        };

        if !secure_compare_bytes(&sha256_digest(&bin), &info.sha256) {
            return Err(HkError::validation("new file hash mismatch after patch"));
        }
        Ok(Some((info.version, bin)))
    }

    /// Apply `next` patches from our version until `target` is reached
    async fn follow_patches(&self, old: &[u8], target: &str) -> Result<Vec<u8>> {
        let engine = DiffEngine::new();
        let mut ver = self.version.clone();
        let mut bin = old.to_vec();

        for _ in 0..MAX_PATCH_HOPS {
            if ver == target {
                return Ok(bin);
            }
            let next = self.client.next_patch(&self.cmd, &ver, &self.plat).await?;
            let hkdiff = self
                .client
                .fetch_bytes(&self.client.patch_url(&self.cmd, &ver, &self.plat))
                .await?;

            let actual = sha1_digest(&hkdiff);
            if hex::encode(actual) != next.sha1 {
                let expected = hex::decode(&next.sha1).unwrap_or_default();
                return Err(PatchError::hash_mismatch("patch", &expected, &actual).into());
            }

            bin = engine.apply_patch(&bin, &hkdiff)?;
            debug!(from = %ver, to = %next.version, "Applied patch");
            ver = next.version;
        }

        if ver == target {
            Ok(bin)
        } else {
            Err(HkError::validation(format!(
                "no patch path to {} within {} hops",
                target, MAX_PATCH_HOPS
            )))
        }
    }

    async fn fetch_full(&self, ver: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.bin_url, gz_key(&self.cmd, ver, &self.plat));
        self.client.fetch_gz(&url).await
    }
}

/// Swap the executable at `exe` for `bin`
fn install(exe: &Path, bin: &[u8]) -> anyhow::Result<()> {
    let dir = exe.parent().unwrap_or(Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("staging update in {}", dir.display()))?;
    staged.write_all(bin)?;
    staged.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o755))?;
    }

    self_replace::self_replace(staged.path()).context("replacing executable")?;
    Ok(())
}

fn cktime_path(dir: &Path) -> PathBuf {
    dir.join(CKTIME)
}

/// Next scheduled check; missing means now, unreadable means far in the future
pub fn read_check_time(path: &Path, now: DateTime<Utc>) -> DateTime<Utc> {
    match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DateTime::<Utc>::UNIX_EPOCH,
        Err(_) => now + ChronoDuration::hours(1000),
        Ok(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| now + ChronoDuration::hours(1000)),
    }
}

fn write_check_time(path: &Path, t: DateTime<Utc>) -> std::io::Result<()> {
    std::fs::write(path, t.to_rfc3339())
}

/// Whether a check is due; if so, schedule the next one 24 to 48 hours out
pub fn want_update(dir: &Path, version: &str, now: DateTime<Utc>) -> bool {
    let path = cktime_path(dir);
    if version == DEV_VERSION || read_check_time(&path, now) > now {
        return false;
    }

    let day = 24 * 60 * 60;
    let wait = ChronoDuration::seconds(day + rand::thread_rng().gen_range(0..day));
    write_check_time(&path, now + wait).is_ok()
}

/// Spawn a detached `hk update` when a check is due
pub fn background_check(config: &Config) {
    let dir = &config.update.dir;
    if let Err(e) = std::fs::create_dir_all(dir) {
        debug!(error = %e, dir = %dir.display(), "No update directory");
        return;
    }
    if !want_update(dir, VERSION, Utc::now()) {
        return;
    }

    let spawned = std::env::current_exe().and_then(|exe| {
        Command::new(exe)
            .arg("update")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    });
    if let Err(e) = spawned {
        warn!(error = %e, "Could not start background update");
    }
}
