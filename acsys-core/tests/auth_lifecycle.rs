//! Token lifecycle integration tests.
//!
//! This test suite covers:
//! - Login, refresh and authorization round trips
//! - Password changes invalidating previously issued tokens
//! - Expired and mistyped tokens
//! - Uniform failures that do not reveal which check failed

#![cfg(feature = "sqlite")]

use acsys_core::drivers::sqlite::SqliteDriver;
use acsys_core::security::{Claims, TokenType};
use acsys_core::{AcsysError, AppConfig, AppContext, DataDriver, Role};
use chrono::Utc;
use std::sync::Arc;

const CONFIG: &str = r#"{
    "database": {"type": "sqlite", "url": "sqlite::memory:"},
    "auth": {
        "secret": "auth-test-secret-auth-test-secret-auth",
        "argon2": {"memory_kib": 8, "iterations": 1, "parallelism": 1}
    }
}"#;

async fn context() -> AppContext {
    let driver = SqliteDriver::new("sqlite::memory:").await.unwrap();
    driver.initialize().await.unwrap();
    let config = AppConfig::from_json(CONFIG).unwrap();
    AppContext::with_driver(config, Arc::new(driver)).await.unwrap()
}

#[tokio::test]
async fn test_auth_session_round_trip() {
    let context = context().await;
    let auth = context.auth();
    let profile = auth
        .create_user("editor", "correct horse", Role::Standard, "e@example.com")
        .await
        .unwrap();
    assert_eq!(profile.role, Role::Standard);

    let session = auth.authenticate("editor", "correct horse").await.unwrap();
    assert_eq!(session.profile, profile);
    assert!(session.tokens.access_expires_at < session.tokens.refresh_expires_at);

    let user = auth.authorize(&session.tokens.access_token).await.unwrap();
    assert_eq!(user.id, profile.id);

    let refreshed = auth.refresh(&session.tokens.refresh_token).await.unwrap();
    assert!(auth.authorize(&refreshed.access_token).await.is_ok());
}

#[tokio::test]
async fn test_auth_password_change_invalidates_tokens() {
    let context = context().await;
    let auth = context.auth();
    let profile = auth
        .create_user("editor", "old-password", Role::Standard, "")
        .await
        .unwrap();
    let session = auth.authenticate("editor", "old-password").await.unwrap();

    auth.change_password(&profile.id, "new-password").await.unwrap();

    assert!(matches!(
        auth.authorize(&session.tokens.access_token).await,
        Err(AcsysError::Authentication)
    ));
    assert!(matches!(
        auth.refresh(&session.tokens.refresh_token).await,
        Err(AcsysError::Authentication)
    ));
    assert!(auth.authenticate("editor", "old-password").await.is_err());

    let fresh = auth.authenticate("editor", "new-password").await.unwrap();
    assert!(auth.authorize(&fresh.tokens.access_token).await.is_ok());
}

#[tokio::test]
async fn test_auth_token_types_are_not_interchangeable() {
    let context = context().await;
    let auth = context.auth();
    auth.create_user("editor", "pw", Role::Standard, "")
        .await
        .unwrap();
    let session = auth.authenticate("editor", "pw").await.unwrap();

    assert!(matches!(
        auth.refresh(&session.tokens.access_token).await,
        Err(AcsysError::Authentication)
    ));
    assert!(matches!(
        auth.authorize(&session.tokens.refresh_token).await,
        Err(AcsysError::Authentication)
    ));
}

#[tokio::test]
async fn test_auth_expired_token_rejected() {
    let context = context().await;
    let auth = context.auth();
    let profile = auth
        .create_user("editor", "pw", Role::Standard, "")
        .await
        .unwrap();
    let hash = context.driver().verify_password(&profile.id).await.unwrap();

    let now = Utc::now().timestamp();
    let expired = auth
        .tokens()
        .encode_claims(&Claims {
            sub: hash,
            uid: Some(profile.id.clone()),
            typ: TokenType::Access,
            iat: now - 7200,
            exp: now - 3600,
        })
        .unwrap();

    assert!(matches!(
        auth.authorize(&expired).await,
        Err(AcsysError::Authentication)
    ));
}

#[tokio::test]
async fn test_auth_deleted_user_tokens_rejected() {
    let context = context().await;
    let auth = context.auth();
    auth.create_user("editor", "pw", Role::Standard, "")
        .await
        .unwrap();
    let session = auth.authenticate("editor", "pw").await.unwrap();

    let filter = acsys_core::QueryOptions::all().with_filter(
        "username",
        acsys_core::Operator::Eq,
        "editor",
    );
    context
        .driver()
        .delete_docs(acsys_core::models::USERS_TABLE, &filter)
        .await
        .unwrap();

    assert!(matches!(
        auth.authorize(&session.tokens.access_token).await,
        Err(AcsysError::Authentication)
    ));
    assert!(matches!(
        auth.refresh(&session.tokens.refresh_token).await,
        Err(AcsysError::Authentication)
    ));
}

#[tokio::test]
async fn test_auth_failure_messages_are_generic() {
    let context = context().await;
    let auth = context.auth();
    auth.create_user("editor", "pw", Role::Standard, "")
        .await
        .unwrap();

    let messages: Vec<&str> = [
        auth.authenticate("editor", "wrong").await.unwrap_err(),
        auth.authenticate("nobody", "pw").await.unwrap_err(),
        auth.authorize("not.a.token").await.unwrap_err(),
    ]
    .iter()
    .map(AcsysError::caller_message)
    .collect();

    assert!(messages.iter().all(|m| *m == acsys_core::error::AUTHENTICATION_FAILED_MESSAGE));
}
