use std::time::Duration;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};

use crate::error::{SessionError, SessionResult};

/// Cookie carrying the signed access token.
pub const ACCESS_TOKEN_COOKIE: &str = "session_token";
/// Cookie carrying the opaque single-use refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "session_refresh";

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const EPOCH_HTTP_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Appends a `Set-Cookie` header for `name`.
///
/// A zero `ttl` produces a browser-session cookie; otherwise both `Expires` and
/// `Max-Age` are emitted since older clients only honour one of them.
pub fn set_cookie(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
    ttl: Duration,
) -> SessionResult<()> {
    let header = set_cookie_value(name, value, ttl, Utc::now())?;
    headers.append(SET_COOKIE, header);
    Ok(())
}

/// Builds a `Set-Cookie` value without touching any header map.
pub fn set_cookie_value(
    name: &'static str,
    value: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> SessionResult<HeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/");
    if !ttl.is_zero() {
        let lifetime =
            chrono::Duration::from_std(ttl).map_err(|_| SessionError::InvalidCookieValue(name))?;
        let expires = now
            .checked_add_signed(lifetime)
            .ok_or(SessionError::InvalidCookieValue(name))?;
        cookie.push_str(&format!(
            "; Expires={}; Max-Age={}",
            expires.format(HTTP_DATE_FORMAT),
            ttl.as_secs()
        ));
    }
    HeaderValue::from_str(&cookie).map_err(|_| SessionError::InvalidCookieValue(name))
}

/// Appends a `Set-Cookie` header instructing the client to drop `name`.
pub fn expire_cookie(headers: &mut HeaderMap, name: &'static str) {
    let cookie = format!("{name}=; Path=/; Expires={EPOCH_HTTP_DATE}; Max-Age=0");
    // Cookie names are constants and the rest is fixed ASCII.
    if let Ok(header) = HeaderValue::from_str(&cookie) {
        headers.append(SET_COOKIE, header);
    }
}

/// Reads `name` from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &'static str) -> SessionResult<String> {
    cookie_segments(headers)
        .filter_map(|segment| segment.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .ok_or(SessionError::CookieMissing(name))
}

/// Produces a single `Cookie` header equal to the current one with `name`
/// replaced by `value`. Returns `None` when the request never carried `name`.
pub fn replace_cookie(
    headers: &HeaderMap,
    name: &'static str,
    value: &str,
) -> SessionResult<Option<HeaderValue>> {
    let mut found = false;
    let mut segments = Vec::new();
    for segment in cookie_segments(headers) {
        let matches = segment
            .split_once('=')
            .is_some_and(|(key, _)| key.trim() == name);
        if matches {
            found = true;
            segments.push(format!("{name}={value}"));
        } else {
            segments.push(segment.to_string());
        }
    }

    if !found {
        return Ok(None);
    }

    HeaderValue::from_str(&segments.join("; "))
        .map(Some)
        .map_err(|_| SessionError::InvalidCookieValue(name))
}

fn cookie_segments(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}
