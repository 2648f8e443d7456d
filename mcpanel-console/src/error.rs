use std::io;

use mcpanel_frame::FrameError;
use mcpanel_pty::SessionError;
use thiserror::Error;

use crate::target::TargetId;

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("session `{0}` not found")]
    SessionNotFound(String),

    #[error("attach failed: {0}")]
    AttachFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("operation timed out")]
    Timeout,

    #[error("unknown target `{0}`")]
    UnknownTarget(TargetId),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("message error: {0}")]
    Frame(#[from] FrameError),

    #[error("rcon error: {0}")]
    Rcon(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
