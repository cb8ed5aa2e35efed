//! HTTP client for the hkdist REST API.

use crate::compression::gunzip;
use crate::netrc::Credentials;
use crate::release::{CurrentInfo, HashInfo, NextPatch, Platform, Release, VersionInfo};
use crate::{HkError, NetworkError, Result};
use reqwest::header::{DATE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime};

/// Result of a conditional release listing
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseList {
    /// Nothing changed since the given time
    NotModified,
    Modified {
        releases: Vec<Release>,
        last_modified: Option<SystemTime>,
    },
}

/// Client for one hkdist server
#[derive(Debug, Clone)]
pub struct DistClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Option<Credentials>,
}

impl DistClient {
    /// Create a client; user info in `base_url` becomes the basic auth credentials
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| HkError::config(format!("invalid dist URL {:?}: {}", base_url, e)))?;

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(Credentials {
                login: url.username().to_string(),
                password: url.password().unwrap_or_default().to_string(),
            })
        };
        let _ = url.set_username("");
        let _ = url.set_password(None);

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::transport(base_url, e))?;

        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            http,
            credentials,
        })
    }

    /// Use `credentials` for mutating requests unless the URL carried its own
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        if self.credentials.is_none() {
            self.credentials = credentials;
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL of the hkdiff leading from `oldver` towards the current version
    pub fn patch_url(&self, cmd: &str, oldver: &str, plat: &Platform) -> String {
        self.url(&format!("{}/{}/next/{}.hkdiff", cmd, oldver, plat))
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| NetworkError::transport(url, e).into())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.send(self.http.get(&url), &url).await?;
        let response = check_status(response, &url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| NetworkError::transport(&url, e).into())
    }

    pub async fn current_info(&self, cmd: &str, plat: &Platform) -> Result<CurrentInfo> {
        self.get_json(&format!("{}/current/{}.json", cmd, plat)).await
    }

    pub async fn release_hash(&self, cmd: &str, ver: &str, plat: &Platform) -> Result<HashInfo> {
        self.get_json(&format!("{}/{}/{}.json", cmd, ver, plat)).await
    }

    pub async fn next_patch(&self, cmd: &str, oldver: &str, plat: &Platform) -> Result<NextPatch> {
        self.get_json(&format!("{}/{}/next/{}.json", cmd, oldver, plat))
            .await
    }

    /// `GET /release.json`, conditional on `if_modified_since`
    pub async fn list_releases(&self, if_modified_since: Option<SystemTime>) -> Result<ReleaseList> {
        let url = self.url("release.json");
        let mut request = self.http.get(&url);
        if let Some(since) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, httpdate::fmt_http_date(since));
        }

        let response = self.send(request, &url).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(ReleaseList::NotModified);
        }
        let response = check_status(response, &url).await?;

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| httpdate::parse_http_date(v).ok());
        let releases = response
            .json::<Vec<Release>>()
            .await
            .map_err(|e| NetworkError::transport(&url, e))?;

        Ok(ReleaseList::Modified {
            releases,
            last_modified,
        })
    }

    fn put(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .put(url)
            .header(DATE, httpdate::fmt_http_date(SystemTime::now()));
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.login, Some(&creds.password));
        }
        request
    }

    /// Register a new release; fails with a conflict if it already exists
    pub async fn register_release(&self, cmd: &str, ver: &str, plat: &Platform, sha256: &[u8]) -> Result<()> {
        let url = self.url(&format!("{}/{}/{}.json", cmd, ver, plat));
        let body = HashInfo {
            sha256: sha256.to_vec(),
        };
        let response = self.send(self.put(&url).json(&body), &url).await?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            StatusCode::CONFLICT => Err(NetworkError::Conflict {
                resource: format!("{}/{}/{}", cmd, ver, plat),
            }
            .into()),
            status => Err(status_error(status, response, &url).await),
        }
    }

    /// Point `(cmd, plat)` at version `ver`
    pub async fn set_current(&self, cmd: &str, plat: &Platform, ver: &str) -> Result<()> {
        let url = self.url(&format!("{}/current/{}.json", cmd, plat));
        let body = VersionInfo {
            version: ver.to_string(),
        };
        let response = self.send(self.put(&url).json(&body), &url).await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(status_error(status, response, &url).await),
        }
    }

    /// Download a URL, following redirects
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(self.http.get(url), url).await?;
        let response = check_status(response, url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| NetworkError::transport(url, e))?;
        Ok(bytes.to_vec())
    }

    /// Download and gunzip a URL
    pub async fn fetch_gz(&self, url: &str) -> Result<Vec<u8>> {
        let compressed = self.fetch_bytes(url).await?;
        gunzip(&compressed)
    }
}

async fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(status_error(status, response, url).await)
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response, url: &str) -> HkError {
    if status == StatusCode::NOT_FOUND {
        return NetworkError::NotFound {
            resource: url.to_string(),
        }
        .into();
    }
    let body = response.text().await.unwrap_or_default();
    NetworkError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body: body.trim().to_string(),
    }
    .into()
}
