use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}
