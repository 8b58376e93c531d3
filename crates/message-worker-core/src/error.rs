use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("broker transport error: {0}")]
    Transport(String),

    #[error("failed to decode message payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("signature validation failed: {0}")]
    Signature(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
