//! Error type shared across the crate.
//!
//! User-initiated operations surface these directly; the background poller
//! downgrades them to an unreachable snapshot instead.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("active profile has no URL or pre-shared key configured")]
    NotConfigured,

    #[error("request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("device returned HTTP {status} for {method}")]
    HttpStatus { status: u16, method: String },

    #[error("device returned API error: {0}")]
    Protocol(serde_json::Value),

    #[error("unexpected response shape: {0}")]
    Parse(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no IR code known for command \"{0}\"")]
    UnknownCommand(String),
}

pub type Result<T> = std::result::Result<T, Error>;
