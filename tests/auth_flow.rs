//! Auth subsystem flows: register, login, refresh, change-password, and the
//! token-invalidation rules, by driving the handlers directly.

use axum::body::to_bytes;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use orgflow::auth::extract::password_changed_after;
use orgflow::auth::jwt::TokenType;
use orgflow::auth::{user, CurrentUser, TokenIssuer};
use orgflow::error::AppError;
use orgflow::handlers::auth::{
    change_password, login, refresh, register, ChangePasswordBody, LoginBody, RegisterBody,
};
use orgflow::ws::Hub;
use orgflow::{AppState, Settings};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn setup_state() -> AppState {
    let pool = orgflow::connect_in_memory().await.unwrap();
    orgflow::ensure_users_table(&pool).await.unwrap();
    let settings = Settings {
        port: 0,
        database_url: "sqlite::memory:".into(),
        entity_config_dir: "entities".into(),
        jwt_secret: "test-secret".into(),
        jwt_expires_in: Duration::from_secs(900),
        jwt_refresh_expires_in: Duration::from_secs(86_400),
        allowed_origins: vec!["*".into()],
        env: "test".into(),
    };
    AppState {
        pool,
        model: Arc::new(orgflow::resolve(Vec::new()).unwrap()),
        hub: Hub::new(),
        tokens: Arc::new(TokenIssuer::new(
            &settings.jwt_secret,
            settings.jwt_expires_in,
            settings.jwt_refresh_expires_in,
        )),
        settings: Arc::new(settings),
    }
}

fn register_body(username: &str, email: &str, password: &str) -> RegisterBody {
    RegisterBody {
        username: Some(username.into()),
        email: Some(email.into()),
        password: Some(password.into()),
        first_name: None,
        last_name: None,
    }
}

fn expect_err<T>(result: Result<T, AppError>) -> AppError {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn register_issues_tokens_and_rejects_duplicates() {
    let state = setup_state().await;

    let resp = register(
        State(state.clone()),
        Json(register_body("ada", "ada@example.com", "correct horse")),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let cookie_count = resp.headers().get_all("set-cookie").iter().count();
    assert_eq!(cookie_count, 2);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["user"]["username"], json!("ada"));
    assert!(body["data"]["user"].get("password").is_none());
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["refreshToken"].is_string());

    let err = expect_err(
        register(
            State(state),
            Json(register_body("ada2", "ada@example.com", "correct horse")),
        )
        .await,
    );
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn register_validates_required_fields_and_password_length() {
    let state = setup_state().await;
    let err = expect_err(
        register(
            State(state),
            Json(RegisterBody {
                username: Some("ada".into()),
                email: None,
                password: Some("short".into()),
                first_name: None,
                last_name: None,
            }),
        )
        .await,
    );
    match err {
        AppError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.field == "email"));
            assert!(errors.iter().any(|e| e.field == "password"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn login_rejects_bad_credentials_and_inactive_accounts() {
    let state = setup_state().await;
    register(
        State(state.clone()),
        Json(register_body("ada", "ada@example.com", "correct horse")),
    )
    .await
    .unwrap();

    // Wrong password is rejected, not waved through.
    let err = expect_err(
        login(
            State(state.clone()),
            Json(LoginBody {
                email: Some("ada@example.com".into()),
                username: None,
                identifier: None,
                password: "wrong horse".into(),
            }),
        )
        .await,
    );
    assert!(matches!(err, AppError::Unauthorized(_)));

    // Works by username too.
    let resp = login(
        State(state.clone()),
        Json(LoginBody {
            email: None,
            username: Some("ada".into()),
            identifier: None,
            password: "correct horse".into(),
        }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["data"]["user"]["lastLogin"].is_string());

    sqlx::query(r#"UPDATE "users" SET "status" = 'suspended'"#)
        .execute(&state.pool)
        .await
        .unwrap();
    let err = expect_err(
        login(
            State(state),
            Json(LoginBody {
                email: Some("ada@example.com".into()),
                username: None,
                identifier: None,
                password: "correct horse".into(),
            }),
        )
        .await,
    );
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn refresh_requires_a_refresh_token() {
    let state = setup_state().await;
    register(
        State(state.clone()),
        Json(register_body("ada", "ada@example.com", "correct horse")),
    )
    .await
    .unwrap();
    let stored = user::find_by_email_or_username(&state.pool, "ada")
        .await
        .unwrap()
        .unwrap();

    let refresh_token = state
        .tokens
        .issue(stored.id, &stored.role, TokenType::Refresh)
        .unwrap();
    let resp = refresh(
        State(state.clone()),
        HeaderMap::new(),
        Some(Json(json!({ "refreshToken": refresh_token }))),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["data"]["accessToken"].is_string());

    // An access token is not accepted in its place.
    let access_token = state
        .tokens
        .issue(stored.id, &stored.role, TokenType::Access)
        .unwrap();
    let err = expect_err(
        refresh(
            State(state),
            HeaderMap::new(),
            Some(Json(json!({ "refreshToken": access_token }))),
        )
        .await,
    );
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn change_password_invalidates_older_tokens() {
    let state = setup_state().await;
    register(
        State(state.clone()),
        Json(register_body("ada", "ada@example.com", "correct horse")),
    )
    .await
    .unwrap();
    let stored = user::find_by_email_or_username(&state.pool, "ada")
        .await
        .unwrap()
        .unwrap();
    let old_token = state
        .tokens
        .issue(stored.id, &stored.role, TokenType::Access)
        .unwrap();
    let old_claims = state.tokens.verify(&old_token).unwrap();

    // Wrong current password.
    let err = expect_err(
        change_password(
            State(state.clone()),
            CurrentUser(stored.clone()),
            Json(ChangePasswordBody {
                current_password: "wrong horse".into(),
                new_password: "battery staple".into(),
                confirm_password: "battery staple".into(),
            }),
        )
        .await,
    );
    assert!(matches!(err, AppError::Unauthorized(_)));

    // Confirmation mismatch.
    let err = expect_err(
        change_password(
            State(state.clone()),
            CurrentUser(stored.clone()),
            Json(ChangePasswordBody {
                current_password: "correct horse".into(),
                new_password: "battery staple".into(),
                confirm_password: "battery stable".into(),
            }),
        )
        .await,
    );
    assert!(matches!(err, AppError::Validation(_)));

    // The changed-at stamp has second precision; make sure it lands after iat.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let resp = change_password(
        State(state.clone()),
        CurrentUser(stored.clone()),
        Json(ChangePasswordBody {
            current_password: "correct horse".into(),
            new_password: "battery staple".into(),
            confirm_password: "battery staple".into(),
        }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(resp.status(), StatusCode::OK);

    let reloaded = user::find_by_id(&state.pool, stored.id).await.unwrap().unwrap();
    assert!(reloaded.password_changed_at.is_some());
    assert!(password_changed_after(&reloaded, old_claims.iat));
    assert!(orgflow::auth::password::verify("battery staple", &reloaded.password));
}
