//! Token service configuration, read from the environment.

use std::time::Duration;

use crate::error::TokenError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TTL_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_ROOM: &str = "consultation-1";

#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    pub port: u16,
    /// LiveKit API key, also the token issuer
    pub api_key: String,
    pub api_secret: String,
    /// Public LiveKit URL advertised to clients, if any
    pub livekit_url: Option<String>,
    pub token_ttl: Duration,
    /// Room used when a request names none
    pub default_room: String,
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, TokenError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TokenError> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| TokenError::Config(format!("{key} must be set")))
        };
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = parse_or(optional("TOKEN_PORT"), "TOKEN_PORT", DEFAULT_PORT);
        let ttl_secs = parse_or(optional("TOKEN_TTL_SECS"), "TOKEN_TTL_SECS", DEFAULT_TTL_SECS);

        Ok(Self {
            host: optional("TOKEN_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            api_key: required("LIVEKIT_API_KEY")?,
            api_secret: required("LIVEKIT_API_SECRET")?,
            livekit_url: optional("LIVEKIT_URL"),
            token_ttl: Duration::from_secs(ttl_secs),
            default_room: optional("TOKEN_DEFAULT_ROOM").unwrap_or_else(|| DEFAULT_ROOM.to_string()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr + std::fmt::Display>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("invalid {key}={raw:?}, using {default}");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, TokenError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_credentials_only() {
        let config = load(&[("LIVEKIT_API_KEY", "devkey"), ("LIVEKIT_API_SECRET", "secret")]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.token_ttl, Duration::from_secs(21_600));
        assert_eq!(config.default_room, "consultation-1");
        assert!(config.livekit_url.is_none());
    }

    #[test]
    fn missing_credentials_fail() {
        let err = load(&[("LIVEKIT_API_KEY", "devkey")]).unwrap_err();
        assert!(err.to_string().contains("LIVEKIT_API_SECRET"), "{err}");
        assert!(load(&[("LIVEKIT_API_KEY", " "), ("LIVEKIT_API_SECRET", "s")]).is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("LIVEKIT_API_KEY", "k"),
            ("LIVEKIT_API_SECRET", "s"),
            ("LIVEKIT_URL", "wss://lk.clinic.example"),
            ("TOKEN_HOST", "127.0.0.1"),
            ("TOKEN_PORT", "9000"),
            ("TOKEN_TTL_SECS", "600"),
            ("TOKEN_DEFAULT_ROOM", "salle-attente"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.token_ttl, Duration::from_secs(600));
        assert_eq!(config.livekit_url.as_deref(), Some("wss://lk.clinic.example"));
        assert_eq!(config.default_room, "salle-attente");
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = load(&[
            ("LIVEKIT_API_KEY", "k"),
            ("LIVEKIT_API_SECRET", "s"),
            ("TOKEN_PORT", "eighty"),
            ("TOKEN_TTL_SECS", "-5"),
        ])
        .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.token_ttl, Duration::from_secs(DEFAULT_TTL_SECS));
    }
}
