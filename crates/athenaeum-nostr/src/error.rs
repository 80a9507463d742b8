use thiserror::Error;

#[derive(Debug, Error)]
pub enum NostrError {
    #[error("relay websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("event signing/parsing error: {0}")]
    Event(#[from] nostr::event::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("key error: {0}")]
    Key(#[from] nostr::key::Error),

    #[error("malformed response content: {0}")]
    MalformedContent(String),
}

pub type Result<T> = std::result::Result<T, NostrError>;
