//! `hkdist build`: build, upload and register one release of a command.

use crate::config::{BuildConfig, DistConfig};
use hk_core::{
    DistClient, HkError, LogContext, ObjectStore, Platform, Release, Result, gz_key, gzip_named,
    lookup_credentials, open_store, sha256_digest, validate_version,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

const USER_AGENT: &str = concat!("hkdist/", env!("CARGO_PKG_VERSION"));
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Version of a `git describe` tag such as `v20.1`
pub fn version_from_tag(tag: &str) -> Result<String> {
    let tag = tag.trim();
    let version = tag
        .strip_prefix('v')
        .ok_or_else(|| HkError::validation(format!("tag {:?} does not start with v", tag)))?;
    validate_version(version)?;
    Ok(version.to_string())
}

/// Run a command to completion, failing on a non-zero exit
async fn run_checked(program: &str, args: &[&str], dir: Option<&Path>, envs: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut command = Command::new(program);
    command.args(args).envs(envs.iter().copied());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    tracing::debug!(program, ?args, "Running");
    let output = command
        .output()
        .await
        .map_err(|e| HkError::internal(format!("{}: {}", program, e)))?;
    if !output.status.success() {
        return Err(HkError::internal(format!(
            "{} {} failed ({}): {}",
            program,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

pub struct Builder {
    config: BuildConfig,
    client: DistClient,
    dist_store: Arc<dyn ObjectStore>,
    plat: Platform,
}

impl Builder {
    pub fn new(config: BuildConfig, client: DistClient, dist_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config,
            client,
            dist_store,
            plat: Platform::current(),
        }
    }

    /// Clone, build, upload, register and mark current
    pub async fn build(&self) -> Result<Release> {
        let context = LogContext::new("build", "hkdist");
        let work_dir = self.config.work_dir.as_path();

        match tokio::fs::remove_dir_all(work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let work_dir_arg = work_dir.to_string_lossy();
        run_checked(
            "git",
            &["clone", "-b", &self.config.branch, &self.config.repo, &work_dir_arg],
            None,
            &[],
        )
        .await?;
        let tag = run_checked("git", &["describe"], Some(work_dir), &[]).await?;
        let ver = version_from_tag(&String::from_utf8_lossy(&tag))?;
        context.info(&format!("building {} {} for {}", self.config.name, ver, self.plat));

        self.ensure_not_built(&ver).await?;

        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| HkError::config("empty build command"))?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_checked(program, &args, Some(work_dir), &[("HK_VERSION", &ver)]).await?;

        let binary = tokio::fs::read(work_dir.join(&self.config.binary_path)).await?;
        let release = self.publish(&ver, &binary).await?;
        context.info(&format!("released {}", release.name()));
        Ok(release)
    }

    /// Fail if the server already knows this version
    pub async fn ensure_not_built(&self, ver: &str) -> Result<()> {
        match self.client.release_hash(&self.config.name, ver, &self.plat).await {
            Ok(_) => Err(HkError::validation(format!(
                "{} {} already built",
                self.config.name, ver
            ))),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Upload a built executable and register it as current
    pub async fn publish(&self, ver: &str, binary: &[u8]) -> Result<Release> {
        let name = &self.config.name;
        let sha256 = sha256_digest(binary).to_vec();
        let release = Release::new(self.plat.clone(), name.clone(), ver, sha256)?;

        let (gz, stats) = gzip_named(binary, &format!("{}-{}", name, ver))?;
        tracing::info!(
            release = %release.name(),
            original = stats.original_size,
            compressed = stats.compressed_size,
            "Uploading executable"
        );
        self.dist_store.put(&gz_key(name, ver, &self.plat), gz).await?;

        self.client
            .register_release(name, ver, &self.plat, &release.sha256)
            .await?;
        self.client.set_current(name, &self.plat, ver).await?;
        Ok(release)
    }
}

/// Entry point of `hkdist build`
pub async fn run(config: DistConfig) -> anyhow::Result<()> {
    config.require(&["DISTURL", "S3DISTURL", "BUILDNAME", "BUILDBRANCH"])?;

    let dist_url = &config.build.dist_url;
    let client = DistClient::new(dist_url, USER_AGENT, CLIENT_TIMEOUT)?
        .with_credentials(lookup_credentials(dist_url)?);
    let dist_store = open_store(&config.dist_store).await?;

    Builder::new(config.build, client, dist_store).build().await?;
    Ok(())
}
