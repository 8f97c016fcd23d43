use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsultError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("room error: {0}")]
    Room(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("media device error: {0}")]
    Device(String),
}
