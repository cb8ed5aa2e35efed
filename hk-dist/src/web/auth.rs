//! Staff authentication and transport middleware.
//!
//! Uploads are authorized by forwarding the caller's `Authorization` header
//! to the identity API and checking the returned account email against the
//! configured staff domain.

use crate::web::error::{ApiError, ApiResult};
use crate::web::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, STRICT_TRANSPORT_SECURITY};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

const IDENTITY_ACCEPT: &str = "application/vnd.heroku+json; version=3";
const HSTS: &str = "max-age=31536000";

/// Account confirmed by the identity API, added to request extensions.
#[derive(Clone, Debug)]
pub struct StaffUser {
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    email: String,
}

/// Reject requests not made by a staff account.
pub async fn require_staff(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .cloned()
        .ok_or(ApiError::Unauthorized)?;

    let user = lookup_account(&state, authorization).await?;
    tracing::debug!(email = %user.email, "Authenticated staff user");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

async fn lookup_account(state: &AppState, authorization: HeaderValue) -> ApiResult<StaffUser> {
    let url = format!("{}/account", state.config.identity_url.trim_end_matches('/'));
    let resp = state
        .http
        .get(&url)
        .header(ACCEPT, IDENTITY_ACCEPT)
        .header(AUTHORIZATION, authorization)
        .send()
        .await
        .map_err(ApiError::internal)?;

    match resp.status() {
        reqwest::StatusCode::OK => {}
        reqwest::StatusCode::UNAUTHORIZED => return Err(ApiError::Unauthorized),
        status => {
            return Err(ApiError::Internal(format!(
                "identity api returned {}",
                status
            )));
        }
    }

    let account: Account = resp.json().await.map_err(ApiError::internal)?;
    if !account.email.ends_with(&state.config.staff_domain) {
        tracing::warn!(email = %account.email, "Rejected non-staff account");
        return Err(ApiError::Unauthorized);
    }
    Ok(StaffUser {
        email: account.email,
    })
}

/// Refuse plain-http requests forwarded by the router when https-only is on.
pub async fn https_only(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.config.https_only {
        return next.run(req).await;
    }

    let forwarded_https = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
    if !forwarded_https {
        return (StatusCode::FORBIDDEN, "https required\n").into_response();
    }

    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
    resp
}
