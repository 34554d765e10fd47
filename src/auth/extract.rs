//! Route protection: extract and verify the caller from a bearer or cookie
//! token, reloading the user row on every request.

use crate::auth::jwt::TokenType;
use crate::auth::user::{self, User};
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

pub const TOKEN_COOKIE: &str = "token";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// The authenticated caller. Extraction fails with 401 when the token is
/// missing/invalid, the user is gone, or the password changed after the
/// token was issued.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// Bearer header first, then the auth cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::to_string);
    bearer.or_else(|| cookie_value(headers, TOKEN_COOKIE))
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let (k, v) = pair.trim().split_once('=')?;
        if k == name {
            return Some(v.to_string());
        }
    }
    None
}

/// True when the password changed after the token was issued; such tokens
/// are dead.
pub fn password_changed_after(user: &User, token_iat: u64) -> bool {
    user.password_changed_at
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|changed| changed.timestamp() > token_iat as i64)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("authentication required".into()))?;
        let claims = state.tokens.verify(&token)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("access token required".into()));
        }
        let user = user::find_by_id(&state.pool, claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user no longer exists".into()))?;
        if password_changed_after(&user, claims.iat) {
            return Err(AppError::Unauthorized("password changed; log in again".into()));
        }
        Ok(CurrentUser(user))
    }
}
