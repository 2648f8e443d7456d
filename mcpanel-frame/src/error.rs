use thiserror::Error;

/// Errors produced while encoding or decoding a single message.
///
/// The extractor never surfaces these: a frame that fails to decode is
/// dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line does not start with `{0} `")]
    MissingCommand(String),
}
