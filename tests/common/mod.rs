#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use std::time::Duration;
use tourgate::{
    ServerConfig, create_app,
    db::{Database, UserStatus, UserType},
    jwt::{TokenCodec, UserIdentity},
};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-test-jwt-secret!";

/// A test app with direct access to its database and token codec.
pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub codec: TokenCodec,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build an app after adjusting the default config.
    pub async fn with_config(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let mut config = ServerConfig::new(db.clone(), JWT_SECRET);
        configure(&mut config);
        Self {
            app: create_app(&config),
            db,
            codec: TokenCodec::new(JWT_SECRET),
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Insert a user row with a fixed ID.
    pub async fn insert_user(&self, id: i64, username: &str, user_type: UserType) {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, user_type) VALUES (?, ?, 'x', ?)",
        )
        .bind(id)
        .bind(username)
        .bind(user_type.as_str())
        .execute(self.db.pool())
        .await
        .expect("Failed to insert user");
    }

    /// Store a valid refresh token for a user, as a login would.
    pub async fn store_refresh_token(&self, user_id: i64, user_type: UserType) {
        let refresh = self
            .codec
            .issue_refresh_token(&identity(user_id, user_type), Duration::from_secs(3600))
            .unwrap();
        self.db
            .refresh_tokens()
            .put(user_id, &refresh.token, Duration::from_secs(3600))
            .await
            .unwrap();
    }

    /// Access token for a user, valid for `ttl`. A zero ttl gives an already expired token.
    pub fn access_token(&self, user_id: i64, user_type: UserType, ttl: Duration) -> String {
        self.codec
            .issue_access_token(&identity(user_id, user_type), ttl)
            .unwrap()
            .token
    }

    /// Insert a user with a live refresh entry and return a valid access token.
    pub async fn signed_in(&self, id: i64, username: &str, user_type: UserType) -> String {
        self.insert_user(id, username, user_type).await;
        self.store_refresh_token(id, user_type).await;
        self.access_token(id, user_type, Duration::from_secs(300))
    }
}

pub fn identity(user_id: i64, user_type: UserType) -> UserIdentity {
    UserIdentity {
        user_id,
        status: UserStatus::Active,
        user_type,
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
