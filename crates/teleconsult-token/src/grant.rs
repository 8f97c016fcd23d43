//! Access grant minting.

use std::time::Duration;

use livekit_api::access_token::{AccessToken, VideoGrants};
use rand::Rng;

use crate::config::Config;
use crate::error::TokenError;

/// Signs LiveKit room-join tokens with the server's API credentials.
#[derive(Clone)]
pub struct TokenIssuer {
    api_key: String,
    api_secret: String,
    ttl: Duration,
    default_room: String,
}

impl TokenIssuer {
    pub fn new(api_key: &str, api_secret: &str, ttl: Duration, default_room: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            ttl,
            default_room: default_room.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.api_key, &config.api_secret, config.token_ttl, &config.default_room)
    }

    /// Room to grant: `room` unless absent or blank.
    pub fn resolve_room(&self, room: Option<&str>) -> String {
        match room.map(str::trim) {
            Some(room) if !room.is_empty() => room.to_string(),
            _ => self.default_room.clone(),
        }
    }

    /// Sign a token letting `identity` join `room`.
    ///
    /// The identity doubles as the display name.
    pub fn mint(&self, room: &str, identity: &str) -> Result<String, TokenError> {
        AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(identity)
            .with_name(identity)
            .with_ttl(self.ttl)
            .with_grants(VideoGrants {
                room_join: true,
                room: room.to_string(),
                ..Default::default()
            })
            .to_jwt()
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

/// Participant identity: `user` unless absent or blank, else `Utilisateur-NNN`.
pub fn resolve_identity(user: Option<&str>) -> String {
    match user.map(str::trim) {
        Some(user) if !user.is_empty() => user.to_string(),
        _ => format!("Utilisateur-{}", rand::thread_rng().gen_range(100..=999)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livekit_api::access_token::TokenVerifier;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("devkey", "a-long-enough-development-secret", Duration::from_secs(3600), "consultation-1")
    }

    #[test]
    fn minted_token_carries_room_and_identity() {
        let token = issuer().mint("consultation-9", "dr-martin").unwrap();
        let claims = TokenVerifier::with_api_key("devkey", "a-long-enough-development-secret")
            .verify(&token)
            .unwrap();
        assert_eq!(claims.iss, "devkey");
        assert_eq!(claims.sub, "dr-martin");
        assert_eq!(claims.name, "dr-martin");
        assert!(claims.video.room_join);
        assert_eq!(claims.video.room, "consultation-9");
    }

    #[test]
    fn token_fails_verification_with_other_secret() {
        let token = issuer().mint("r", "u").unwrap();
        assert!(TokenVerifier::with_api_key("devkey", "wrong-secret").verify(&token).is_err());
    }

    #[test]
    fn empty_credentials_cannot_sign() {
        let issuer = TokenIssuer::new("", "", Duration::from_secs(60), "r");
        assert!(matches!(issuer.mint("r", "u"), Err(TokenError::Signing(_))));
    }

    #[test]
    fn blank_room_uses_default() {
        let issuer = issuer();
        assert_eq!(issuer.resolve_room(None), "consultation-1");
        assert_eq!(issuer.resolve_room(Some("  ")), "consultation-1");
        assert_eq!(issuer.resolve_room(Some("cardio-3")), "cardio-3");
    }

    #[test]
    fn default_identity_is_numbered() {
        for _ in 0..50 {
            let identity = resolve_identity(None);
            let n: u32 = identity.strip_prefix("Utilisateur-").unwrap().parse().unwrap();
            assert!((100..=999).contains(&n), "{identity}");
        }
        assert!(resolve_identity(Some("")).starts_with("Utilisateur-"));
        assert_eq!(resolve_identity(Some("patient")), "patient");
    }
}
