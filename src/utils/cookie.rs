// src/utils/cookie.rs

//! Session cookie encoding and extraction.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::error::AppError;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

/// Builds the `Set-Cookie` value delivering a session token.
pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Builds the `Set-Cookie` value that expires the session cookie immediately.
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    let cookie = if secure {
        "jwt=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict; Secure"
    } else {
        "jwt=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict"
    };
    HeaderValue::from_static(cookie)
}

/// Reads the session token out of the request's `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
