//! Request handlers for the dist API.

use crate::web::error::{ApiError, ApiResult};
use crate::web::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{IF_MODIFIED_SINCE, LAST_MODIFIED, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use hk_core::{
    CurrentInfo, HashInfo, NextPatch, Platform, Release, VersionInfo, gz_key, validate_ident,
    validate_sha256, validate_version,
};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Largest JSON body accepted on upload routes
pub const MAX_BODY: usize = 1000;

/// Strip `suffix` from the last path segment and parse what remains as a platform
fn platform_segment(segment: &str, suffix: &str) -> ApiResult<Platform> {
    let plat = segment.strip_suffix(suffix).ok_or(ApiError::NotFound)?;
    validate_ident(plat)?;
    Ok(plat.parse()?)
}

/// Strip `suffix` from a command segment such as `hk.gz`
fn command_segment<'a>(segment: &'a str, suffix: &str) -> ApiResult<&'a str> {
    let cmd = segment.strip_suffix(suffix).ok_or(ApiError::NotFound)?;
    validate_ident(cmd)?;
    Ok(cmd)
}

fn check_release_path(cmd: &str, ver: &str) -> ApiResult<()> {
    validate_ident(cmd)?;
    validate_version(ver)?;
    Ok(())
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    if body.len() > MAX_BODY {
        return Err(ApiError::Unprocessable("request body too large".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Unprocessable(e.to_string()))
}

/// `PUT /{cmd}/{ver}/{plat}.json`
pub async fn put_release(
    State(state): State<AppState>,
    Path((cmd, ver, plat)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    check_release_path(&cmd, &ver)?;
    let plat = platform_segment(&plat, ".json")?;
    let info: HashInfo = parse_body(&body)?;
    validate_sha256(&info.sha256).map_err(|e| ApiError::Unprocessable(e.to_string()))?;

    let release = Release::new(plat, cmd, ver, info.sha256)?;
    state.db.register_release(&release).await?;
    Ok((StatusCode::CREATED, "created\n").into_response())
}

/// `PUT /{cmd}/current/{plat}.json`
pub async fn put_current(
    State(state): State<AppState>,
    Path((cmd, plat)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    validate_ident(&cmd)?;
    let plat = platform_segment(&plat, ".json")?;
    let info: VersionInfo = parse_body(&body)?;
    validate_version(&info.version)
        .map_err(|_| ApiError::Unprocessable("bad version in body".to_string()))?;

    state.db.set_current(&plat, &cmd, &info.version).await?;
    Ok((StatusCode::OK, "ok\n").into_response())
}

/// `GET /{cmd}.gz`, a redirect to the current build for the caller's platform
pub async fn get_gz(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Redirect> {
    let cmd = command_segment(&segment, ".gz")?;
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let plat = Platform::guess_from_user_agent(user_agent);

    let current = state
        .db
        .current_info(&plat, cmd)
        .await?
        .ok_or(ApiError::NotFound)?;
    let url = state.dist_store.url(&gz_key(cmd, &current.version, &plat));
    Ok(Redirect::temporary(&url))
}

/// `GET /{cmd}/current/{plat}.json`
pub async fn get_current(
    State(state): State<AppState>,
    Path((cmd, plat)): Path<(String, String)>,
) -> ApiResult<Json<CurrentInfo>> {
    validate_ident(&cmd)?;
    let plat = platform_segment(&plat, ".json")?;
    let info = state
        .db
        .current_info(&plat, &cmd)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(info))
}

/// `GET /{cmd}/{ver}/{plat}.json`
pub async fn get_release(
    State(state): State<AppState>,
    Path((cmd, ver, plat)): Path<(String, String, String)>,
) -> ApiResult<Json<HashInfo>> {
    check_release_path(&cmd, &ver)?;
    let plat = platform_segment(&plat, ".json")?;
    let sha256 = state
        .db
        .release_hash(&plat, &cmd, &ver)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(HashInfo { sha256 }))
}

async fn lookup_next(
    state: &AppState,
    cmd: &str,
    oldver: &str,
    plat: &Platform,
) -> ApiResult<NextPatch> {
    state
        .db
        .next_patch(plat, cmd, oldver)
        .await?
        .ok_or(ApiError::NotFound)
}

/// `GET /{cmd}/{oldver}/next/{plat}.json` or `.hkdiff`
pub async fn get_next(
    State(state): State<AppState>,
    Path((cmd, oldver, plat)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    check_release_path(&cmd, &oldver)?;

    if plat.ends_with(".hkdiff") {
        let plat = platform_segment(&plat, ".hkdiff")?;
        let next = lookup_next(&state, &cmd, &oldver, &plat).await?;
        let url = state.patch_store.url(&next.sha1);
        return Ok(Redirect::temporary(&url).into_response());
    }

    let plat = platform_segment(&plat, ".json")?;
    let next = lookup_next(&state, &cmd, &oldver, &plat).await?;
    Ok(Json(next).into_response())
}

/// Whether the catalogue changed after the client's `If-Modified-Since`
fn modified_since(headers: &HeaderMap, last_modified: SystemTime) -> bool {
    let Some(since) = headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
    else {
        return true;
    };
    whole_seconds(last_modified) > whole_seconds(since)
}

fn whole_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// `GET /release.json`
pub async fn list_releases(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let last_modified = SystemTime::from(state.db.last_modified().await?);
    let stamp = HeaderValue::from_str(&httpdate::fmt_http_date(last_modified))
        .map_err(ApiError::internal)?;

    if !modified_since(&headers, last_modified) {
        return Ok((StatusCode::NOT_MODIFIED, [(LAST_MODIFIED, stamp)]).into_response());
    }

    let releases = state.db.list_releases().await?;
    Ok(([(LAST_MODIFIED, stamp)], Json(releases)).into_response())
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    if state.db.health_check().await {
        (StatusCode::OK, "ok\n").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "database unavailable\n").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_segment() {
        let plat = platform_segment("linux-amd64.json", ".json").unwrap();
        assert_eq!(plat.to_string(), "linux-amd64");

        let err = platform_segment("linux-amd64.txt", ".json").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = platform_segment("linux_amd64.json", ".json").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_body_limit() {
        let body = Bytes::from(vec![b' '; MAX_BODY + 1]);
        let err = parse_body::<VersionInfo>(&body).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_modified_since() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut headers = HeaderMap::new();
        assert!(modified_since(&headers, t));

        headers.insert(
            IF_MODIFIED_SINCE,
            HeaderValue::from_str(&httpdate::fmt_http_date(t)).unwrap(),
        );
        assert!(!modified_since(&headers, t + Duration::from_millis(400)));
        assert!(modified_since(&headers, t + Duration::from_secs(1)));

        headers.insert(IF_MODIFIED_SINCE, HeaderValue::from_static("yesterday"));
        assert!(modified_since(&headers, t));
    }
}
