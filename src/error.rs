use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed feed message: {0}")]
    MalformedMessage(String),

    #[error("unexpected API response: {0}")]
    Api(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::LockPoisoned(err.to_string())
    }
}
