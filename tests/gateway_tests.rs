//! Tests for the authentication gateway.
//!
//! Tests cover:
//! - Rejection codes for missing, forged, expired and revoked tokens
//! - Silent renewal of expired access tokens from the stored refresh token
//! - Per-request identity context isolation

mod common;

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
};
use common::{TestApp, body_json, body_string};
use std::time::Duration;
use tourgate::{
    auth::{NEW_ACCESS_TOKEN_HEADER, RequestContext, USER_ID, USER_TYPE},
    db::{UserStatus, UserType, unix_now},
    jwt::{Parsed, TokenCodec},
};
use tower::ServiceExt;

const VALID: Duration = Duration::from_secs(300);

#[tokio::test]
async fn test_missing_token() {
    let app = TestApp::new().await;

    let response = app.get("/api/auth/me", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "NEED_TOKEN");
}

#[tokio::test]
async fn test_empty_bearer_is_missing() {
    let app = TestApp::new().await;

    let response = app
        .request(
            axum::http::Request::builder()
                .uri("/api/auth/me")
                .header("authorization", "Bearer   ")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(body_string(response).await, "NEED_TOKEN");
}

#[tokio::test]
async fn test_malformed_token() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;

    let response = app.get("/api/auth/me", Some("not.a.jwt")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_forged_token() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;

    let forger = TokenCodec::new(b"some-other-secret-some-other-secret");
    let forged = forger
        .issue_access_token(&common::identity(42, UserType::Admin), VALID)
        .unwrap();

    let response = app.get("/api/auth/me", Some(&forged.token)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_forged_expired_token_is_not_renewed() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;

    let forger = TokenCodec::new(b"some-other-secret-some-other-secret");
    let forged = forger
        .issue_access_token(&common::identity(42, UserType::User), Duration::ZERO)
        .unwrap();

    let response = app.get("/api/auth/me", Some(&forged.token)).await;

    assert_eq!(body_string(response).await, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_refresh_token_rejected_as_access_token() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;

    let refresh = app
        .codec
        .issue_refresh_token(&common::identity(42, UserType::User), VALID)
        .unwrap();

    let response = app.get("/api/auth/me", Some(&refresh.token)).await;

    assert_eq!(body_string(response).await, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_valid_token() {
    let app = TestApp::new().await;
    let token = app.signed_in(42, "alice", UserType::User).await;

    let response = app.get("/api/auth/me", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(NEW_ACCESS_TOKEN_HEADER).is_none());

    let json = body_json(response).await;
    assert_eq!(json["user_id"], 42);
    assert_eq!(json["username"], "alice");
    assert_eq!(json["user_type"], "user");
}

#[tokio::test]
async fn test_valid_token_without_refresh_entry() {
    let app = TestApp::new().await;
    app.insert_user(42, "alice", UserType::User).await;
    let token = app.access_token(42, UserType::User, VALID);

    let response = app.get("/api/auth/me", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "USER_NOT_EXIST_OR_BANNED");
}

#[tokio::test]
async fn test_valid_token_with_disabled_status() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;

    let mut identity = common::identity(42, UserType::User);
    identity.status = UserStatus::Disabled;
    let token = app.codec.issue_access_token(&identity, VALID).unwrap();

    let response = app.get("/api/auth/me", Some(&token.token)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "ACCOUNT_DISABLED");
}

#[tokio::test]
async fn test_expired_token_without_refresh_entry() {
    let app = TestApp::new().await;
    app.insert_user(42, "alice", UserType::User).await;
    let token = app.access_token(42, UserType::User, Duration::ZERO);

    let response = app.get("/api/auth/me", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_expired_token_is_renewed() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;
    let expired = app
        .codec
        .issue_access_token(&common::identity(42, UserType::User), Duration::ZERO)
        .unwrap();

    let response = app.get("/api/auth/me", Some(&expired.token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let renewed = response
        .headers()
        .get(NEW_ACCESS_TOKEN_HEADER)
        .expect("renewed token header")
        .to_str()
        .unwrap()
        .to_string();

    // The request proceeds as the token's user
    let json = body_json(response).await;
    assert_eq!(json["user_id"], 42);

    let Parsed::Valid(claims) = app.codec.parse_access_token(&renewed).unwrap() else {
        panic!("renewed token should be valid");
    };
    assert_eq!(claims.sub, "42");
    assert!(claims.exp > expired.expires_at);

    // The renewed token is accepted on its own
    let response = app.get("/api/auth/me", Some(&renewed)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(NEW_ACCESS_TOKEN_HEADER).is_none());
}

#[tokio::test]
async fn test_token_renewed_after_ttl_elapses() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;
    let short = app
        .codec
        .issue_access_token(&common::identity(42, UserType::User), Duration::from_secs(1))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;

    let response = app.get("/api/auth/me", Some(&short.token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let renewed = response.headers()[NEW_ACCESS_TOKEN_HEADER].to_str().unwrap();
    let claims = app.codec.parse_access_token(renewed).unwrap().into_claims();
    assert_eq!(claims.sub, "42");
    assert!(claims.exp > short.expires_at);
}

#[tokio::test]
async fn test_renewal_uses_current_account_state() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;
    let expired = app.access_token(42, UserType::User, Duration::ZERO);

    sqlx::query("UPDATE users SET user_type = 'admin' WHERE id = 42")
        .execute(app.db.pool())
        .await
        .unwrap();

    let response = app.get("/api/auth/me", Some(&expired)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["user_type"], "admin");
}

#[tokio::test]
async fn test_expired_token_for_disabled_account() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;
    app.db
        .users()
        .set_status(42, UserStatus::Disabled)
        .await
        .unwrap();
    let expired = app.access_token(42, UserType::User, Duration::ZERO);

    let response = app.get("/api/auth/me", Some(&expired)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "ACCOUNT_DISABLED");
}

#[tokio::test]
async fn test_expired_token_for_missing_user() {
    let app = TestApp::new().await;
    // Refresh entry without a user row
    app.store_refresh_token(99, UserType::User).await;
    let expired = app.access_token(99, UserType::User, Duration::ZERO);

    let response = app.get("/api/auth/me", Some(&expired)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "USER_NOT_EXIST_OR_BANNED");
}

#[tokio::test]
async fn test_corrupt_refresh_entry() {
    let app = TestApp::new().await;
    app.insert_user(42, "alice", UserType::User).await;
    app.db
        .refresh_tokens()
        .put(42, "garbage", Duration::from_secs(3600))
        .await
        .unwrap();
    let expired = app.access_token(42, UserType::User, Duration::ZERO);

    let response = app.get("/api/auth/me", Some(&expired)).await;

    assert_eq!(body_string(response).await, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_refresh_entry_for_other_user() {
    let app = TestApp::new().await;
    app.insert_user(42, "alice", UserType::User).await;
    let bobs = app
        .codec
        .issue_refresh_token(&common::identity(7, UserType::User), VALID)
        .unwrap();
    app.db
        .refresh_tokens()
        .put(42, &bobs.token, Duration::from_secs(3600))
        .await
        .unwrap();
    let expired = app.access_token(42, UserType::User, Duration::ZERO);

    let response = app.get("/api/auth/me", Some(&expired)).await;

    assert_eq!(body_string(response).await, "INVALID_TOKEN");
}

#[tokio::test]
async fn test_renewal_touches_sessions() {
    let app = TestApp::new().await;
    app.signed_in(42, "alice", UserType::User).await;
    let old = unix_now() - 10 * 24 * 60 * 60;
    let session_id = app.db.sessions().create(42, old).await.unwrap();
    let expired = app.access_token(42, UserType::User, Duration::ZERO);

    let response = app.get("/api/auth/me", Some(&expired)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let session = app.db.sessions().get(&session_id).await.unwrap().unwrap();
    assert!(session.update_time > old);
}

/// Outer layer asserting nothing is visible in the context outside the gateway.
async fn assert_no_context(request: Request, next: Next) -> Response {
    assert!(RequestContext::get(USER_ID).is_none());
    let response = next.run(request).await;
    assert!(RequestContext::get(USER_ID).is_none());
    assert!(RequestContext::get(USER_TYPE).is_none());
    response
}

#[tokio::test(flavor = "current_thread")]
async fn test_context_does_not_leak_between_requests() {
    let app = TestApp::new().await;
    let alice = app.signed_in(42, "alice", UserType::User).await;
    let bob = app.signed_in(7, "bob", UserType::Admin).await;
    let router = app.app.clone().layer(middleware::from_fn(assert_no_context));

    let send = |token: Option<String>| {
        let router = router.clone();
        async move {
            let mut builder = axum::http::Request::builder().uri("/api/auth/me");
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {}", token));
            }
            router
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap()
        }
    };

    let response = send(Some(alice.clone())).await;
    assert_eq!(body_json(response).await["user_id"], 42);

    // Rejected request in between
    let response = send(Some("bad".to_string())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing token in between
    let response = send(None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Handler error in between: authenticated, but no user row behind the id
    app.store_refresh_token(55, UserType::User).await;
    let ghost = app.access_token(55, UserType::User, Duration::from_secs(300));
    let response = send(Some(ghost)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(Some(bob)).await;
    let json = body_json(response).await;
    assert_eq!(json["user_id"], 7);
    assert_eq!(json["user_type"], "admin");

    let response = send(Some(alice)).await;
    assert_eq!(body_json(response).await["user_id"], 42);
}

#[tokio::test]
async fn test_concurrent_requests_see_own_identity() {
    let app = TestApp::new().await;
    let mut tokens = Vec::new();
    for id in 1..=8 {
        let token = app
            .signed_in(id, &format!("user{}", id), UserType::User)
            .await;
        tokens.push((id, token));
    }

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|(id, token)| {
            let router = app.app.clone();
            tokio::spawn(async move {
                let response = router
                    .oneshot(
                        axum::http::Request::builder()
                            .uri("/api/auth/me")
                            .header("authorization", format!("Bearer {}", token))
                            .body(Body::empty())
                            .unwrap(),
                    )
                    .await
                    .unwrap();
                (id, body_json(response).await)
            })
        })
        .collect();

    for handle in handles {
        let (id, json) = handle.await.unwrap();
        assert_eq!(json["user_id"], id);
    }
}
