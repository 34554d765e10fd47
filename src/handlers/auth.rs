//! Auth handlers: register, login, logout, refresh, me, change-password.
//! Tokens travel both as httpOnly cookies and in the JSON body.

use crate::auth::extract::{cookie_value, CurrentUser, REFRESH_COOKIE, TOKEN_COOKIE};
use crate::auth::jwt::TokenType;
use crate::auth::user::{self, NewUser, User};
use crate::auth::password;
use crate::error::{AppError, FieldError};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::AppendHeaders,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

fn auth_cookie(name: &str, value: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    )
}

fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

type CookiePair = AppendHeaders<[(header::HeaderName, String); 2]>;

fn issue_token_pair(state: &AppState, user: &User) -> Result<(String, String, CookiePair), AppError> {
    let access = state.tokens.issue(user.id, &user.role, TokenType::Access)?;
    let refresh = state.tokens.issue(user.id, &user.role, TokenType::Refresh)?;
    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            auth_cookie(TOKEN_COOKIE, &access, state.tokens.access_ttl().as_secs()),
        ),
        (
            header::SET_COOKIE,
            auth_cookie(REFRESH_COOKIE, &refresh, state.tokens.refresh_ttl().as_secs()),
        ),
    ]);
    Ok((access, refresh, cookies))
}

fn session_body(user: &User, access: &str, refresh: &str) -> Value {
    json!({
        "data": {
            "user": user.public_json(),
            "accessToken": access,
            "refreshToken": refresh,
        }
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let username = body.username.unwrap_or_default();
    let email = body.email.unwrap_or_default();
    let raw_password = body.password.unwrap_or_default();

    let mut errors = Vec::new();
    if username.is_empty() {
        errors.push(FieldError::new("username", "username is required", None));
    }
    if email.is_empty() {
        errors.push(FieldError::new("email", "email is required", None));
    }
    if raw_password.is_empty() {
        errors.push(FieldError::new("password", "password is required", None));
    } else if raw_password.len() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("password must be at least {} characters", MIN_PASSWORD_LENGTH),
            None,
        ));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    if user::email_or_username_taken(&state.pool, &email, &username).await? {
        return Err(AppError::Conflict("email or username already registered".into()));
    }

    let password_hash = password::hash(&raw_password)?;
    let user = user::insert(
        &state.pool,
        NewUser {
            username: &username,
            email: &email,
            password_hash: &password_hash,
            first_name: body.first_name.as_deref(),
            last_name: body.last_name.as_deref(),
        },
    )
    .await?;
    tracing::info!(user = user.id, "registered");

    let (access, refresh, cookies) = issue_token_pair(&state, &user)?;
    Ok((
        StatusCode::CREATED,
        cookies,
        Json(session_body(&user, &access, &refresh)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let identifier = body
        .identifier
        .or(body.email)
        .or(body.username)
        .ok_or_else(|| AppError::BadRequest("email or username is required".into()))?;

    let user = user::find_by_email_or_username(&state.pool, &identifier).await?;
    // Same rejection for unknown user and wrong password.
    let user = match user {
        Some(u) if password::verify(&body.password, &u.password) => u,
        _ => return Err(AppError::Unauthorized("invalid credentials".into())),
    };
    if user.status != "active" {
        return Err(AppError::Unauthorized("account is not active".into()));
    }

    user::touch_last_login(&state.pool, user.id).await?;
    tracing::info!(user = user.id, "logged in");

    let (access, refresh, cookies) = issue_token_pair(&state, &user)?;
    Ok((
        StatusCode::OK,
        cookies,
        Json(session_body(&user, &access, &refresh)),
    ))
}

pub async fn logout() -> impl axum::response::IntoResponse {
    let cookies = AppendHeaders([
        (header::SET_COOKIE, clear_cookie(TOKEN_COOKIE)),
        (header::SET_COOKIE, clear_cookie(REFRESH_COOKIE)),
    ]);
    (StatusCode::OK, cookies, Json(json!({ "data": null })))
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let token = body
        .as_ref()
        .and_then(|Json(v)| v.get("refreshToken"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| cookie_value(&headers, REFRESH_COOKIE))
        .ok_or_else(|| AppError::Unauthorized("refresh token required".into()))?;

    let claims = state.tokens.verify(&token)?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("refresh token required".into()));
    }
    let user = user::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".into()))?;
    if crate::auth::extract::password_changed_after(&user, claims.iat) {
        return Err(AppError::Unauthorized("password changed; log in again".into()));
    }

    let access = state.tokens.issue(user.id, &user.role, TokenType::Access)?;
    let cookie = AppendHeaders([(
        header::SET_COOKIE,
        auth_cookie(TOKEN_COOKIE, &access, state.tokens.access_ttl().as_secs()),
    )]);
    Ok((
        StatusCode::OK,
        cookie,
        Json(json!({ "data": { "accessToken": access } })),
    ))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({ "data": user.public_json() }))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ChangePasswordBody>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if !password::verify(&body.current_password, &user.password) {
        return Err(AppError::Unauthorized("current password is incorrect".into()));
    }
    let mut errors = Vec::new();
    if body.new_password.len() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "newPassword",
            format!("password must be at least {} characters", MIN_PASSWORD_LENGTH),
            None,
        ));
    }
    if body.new_password != body.confirm_password {
        errors.push(FieldError::new(
            "confirmPassword",
            "password confirmation does not match",
            None,
        ));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let password_hash = password::hash(&body.new_password)?;
    user::set_password(&state.pool, user.id, &password_hash).await?;
    tracing::info!(user = user.id, "password changed");

    // Old tokens die with the passwordChangedAt stamp; hand out fresh ones.
    let user = user::find_by_id(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".into()))?;
    let (access, refresh, cookies) = issue_token_pair(&state, &user)?;
    Ok((
        StatusCode::OK,
        cookies,
        Json(session_body(&user, &access, &refresh)),
    ))
}
