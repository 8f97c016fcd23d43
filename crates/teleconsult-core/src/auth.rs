use crate::errors::ConsultError;
use serde::Deserialize;

/// Body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    url: Option<String>,
}

/// Access grant handed from the token service to the client.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// JWT access token, opaque to the client.
    pub token: String,
    /// WebSocket URL of the LiveKit server, when the token service advertises one.
    pub server_url: Option<String>,
}

/// Requests LiveKit access tokens from the consultation token service.
#[derive(Debug, Clone)]
pub struct TokenClient {
    api_base: String,
    http: reqwest::Client,
}

impl TokenClient {
    /// `api_base_url` is the token service root, e.g. `http://localhost:8000`.
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base: api_base_url.trim().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Full token URL for the given room and participant.
    pub fn token_url(&self, room: &str, user: &str) -> String {
        format!(
            "{}/api/video/token?room={}&user={}",
            self.api_base,
            urlencoding::encode(room),
            urlencoding::encode(user)
        )
    }

    /// Fetch a grant for `user` to join `room`.
    pub async fn request_token(&self, room: &str, user: &str) -> Result<TokenGrant, ConsultError> {
        let url = self.token_url(room, user);
        tracing::info!("requesting token: room={room} user={user}");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ConsultError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ConsultError::Auth(format!(
                "token endpoint returned status {}",
                resp.status()
            )));
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ConsultError::Auth(format!("invalid token response: {e}")))?;

        if data.token.is_empty() {
            return Err(ConsultError::Auth("token endpoint returned an empty token".into()));
        }

        Ok(TokenGrant {
            token: data.token,
            server_url: data.url.map(|u| to_websocket_url(&u)),
        })
    }
}

/// LiveKit signaling runs over WebSocket; accept http(s) URLs from configuration.
pub fn to_websocket_url(url: &str) -> String {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Throwaway token services for tests.
#[cfg(test)]
pub(crate) mod test_server {
    use axum::extract::RawQuery;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// A token endpoint answering every request with `status` and `body`.
    /// Query strings of received requests are collected in the returned log.
    pub async fn canned(
        status: StatusCode,
        body: impl Into<String>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let body: String = body.into();
        let queries = Arc::new(Mutex::new(Vec::new()));
        let log = queries.clone();
        let router = Router::new().route(
            "/api/video/token",
            get(move |RawQuery(query): RawQuery| {
                let log = log.clone();
                let body = body.clone();
                async move {
                    log.lock().unwrap().push(query.unwrap_or_default());
                    (status, [("content-type", "application/json")], body)
                }
            }),
        );
        (serve(router).await, queries)
    }

    /// Base URL of a port nothing listens on.
    pub async fn unreachable() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }
}
