use std::io;

#[cfg(unix)]
use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[cfg(unix)]
    #[error("error from *nix bindings: {0}")]
    Nix(#[from] Errno),

    #[error("pty I/O error: {0}")]
    IO(#[from] io::Error),

    #[error("failed to resize pty: {0}")]
    Resize(io::Error),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Whether the error only means "no data right now".
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::IO(err) if err.kind() == io::ErrorKind::WouldBlock)
    }
}
