//! Admin session check.
//!
//! An admin request is authorized when the `admin_api_key` cookie or the
//! `X-Admin-Key` header equals the configured key. Anything else is sent to
//! the login page.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::state::AppState;

pub const ADMIN_COOKIE: &str = "admin_api_key";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
pub const LOGIN_PATH: &str = "/admin/login";

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// The key presented by the client, cookie first.
pub fn presented_key(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    jar.get(ADMIN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get(ADMIN_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
}

pub fn login_cookie(api_key: &str, max_age_secs: u64) -> Cookie<'static> {
    Cookie::build((ADMIN_COOKIE, api_key.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs as i64))
        .build()
}

pub fn logout_cookie() -> Cookie<'static> {
    Cookie::build(ADMIN_COOKIE).path("/").build()
}

/// Extractor guarding the admin pages.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession;

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        match presented_key(&jar, &parts.headers) {
            Some(key) if key == state.config.admin.api_key => Ok(AdminSession),
            _ => {
                tracing::debug!(path = %parts.uri.path(), "admin session missing or invalid");
                Err(found(LOGIN_PATH))
            }
        }
    }
}
