//! Teleconsult token service
//!
//! Mints short-lived LiveKit access tokens so a participant can join a
//! consultation room. The LiveKit API secret never leaves this service.

pub mod api;
pub mod config;
pub mod error;
pub mod grant;

pub use config::Config;
pub use error::TokenError;
pub use grant::TokenIssuer;
