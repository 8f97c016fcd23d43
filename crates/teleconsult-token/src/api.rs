//! HTTP API of the token service
//!
//! - `GET /api/video/token?room=<room>&user=<user>` - mint a room-join token
//! - `GET /health` - liveness check

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::TokenError;
use crate::grant::{resolve_identity, TokenIssuer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
    /// Public LiveKit URL echoed to clients
    pub livekit_url: Option<String>,
}

impl AppState {
    pub fn new(issuer: TokenIssuer, livekit_url: Option<String>) -> Self {
        Self {
            issuer: Arc::new(issuer),
            livekit_url,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(TokenIssuer::from_config(config), config.livekit_url.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub room: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Handler error, rendered as `{"error": "..."}`.
pub struct ApiError(TokenError);

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("token request failed: {}", self.0);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    // The client is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/video/token", get(issue_token))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn issue_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenResponse>, ApiError> {
    let room = state.issuer.resolve_room(query.room.as_deref());
    let identity = resolve_identity(query.user.as_deref());
    let token = state.issuer.mint(&room, &identity)?;
    tracing::info!(room = %room, identity = %identity, "token issued");
    Ok(Json(TokenResponse {
        token,
        url: state.livekit_url.clone(),
    }))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use livekit_api::access_token::TokenVerifier;
    use std::time::Duration;
    use tower::ServiceExt;

    const KEY: &str = "devkey";
    const SECRET: &str = "a-long-enough-development-secret";

    fn router(livekit_url: Option<&str>) -> Router {
        let issuer = TokenIssuer::new(KEY, SECRET, Duration::from_secs(3600), "consultation-1");
        build_router(AppState::new(issuer, livekit_url.map(str::to_string)))
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn verify(token: &serde_json::Value) -> livekit_api::access_token::Claims {
        TokenVerifier::with_api_key(KEY, SECRET)
            .verify(token.as_str().unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn token_for_room_and_user() {
        let (status, body) =
            get_json(router(None), "/api/video/token?room=cardio-2&user=dr-martin").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("url").is_none());

        let claims = verify(&body["token"]);
        assert_eq!(claims.sub, "dr-martin");
        assert_eq!(claims.video.room, "cardio-2");
        assert!(claims.video.room_join);
    }

    #[tokio::test]
    async fn token_defaults_room_and_user() {
        let (status, body) = get_json(router(None), "/api/video/token").await;
        assert_eq!(status, StatusCode::OK);

        let claims = verify(&body["token"]);
        assert_eq!(claims.video.room, "consultation-1");
        assert!(claims.sub.starts_with("Utilisateur-"), "{}", claims.sub);
    }

    #[tokio::test]
    async fn blank_parameters_use_defaults() {
        let (_, body) = get_json(router(None), "/api/video/token?room=&user=%20").await;
        let claims = verify(&body["token"]);
        assert_eq!(claims.video.room, "consultation-1");
        assert!(claims.sub.starts_with("Utilisateur-"));
    }

    #[tokio::test]
    async fn configured_server_url_is_advertised() {
        let (_, body) =
            get_json(router(Some("wss://lk.clinic.example")), "/api/video/token?room=r&user=u").await;
        assert_eq!(body["url"], "wss://lk.clinic.example");
    }

    #[tokio::test]
    async fn signing_failure_is_500_with_error_body() {
        let issuer = TokenIssuer::new("", "", Duration::from_secs(60), "consultation-1");
        let router = build_router(AppState::new(issuer, None));
        let (status, body) = get_json(router, "/api/video/token?room=r&user=u").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("signing"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = router(None)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
