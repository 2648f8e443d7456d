use mio::Token;

use crate::{PtySize, SessionError};

/// A running console process attached to a terminal.
pub trait Session: Send {
    /// Read bytes produced by the process. Non-blocking sessions report
    /// `WouldBlock` through [`SessionError::IO`]; `Ok(0)` is end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError>;

    /// Write bytes to the process input.
    fn write(&mut self, input: &[u8]) -> Result<usize, SessionError>;

    /// Change the terminal size seen by the process.
    fn resize(&mut self, size: PtySize) -> Result<(), SessionError>;

    /// Terminate the process and report its exit code.
    fn close(&mut self) -> Result<i32, SessionError>;

    /// Exit code of the process if it finished since the last call, without
    /// blocking.
    fn try_get_child_exit_status(&mut self) -> Result<Option<i32>, SessionError>;
}

/// Sources a session exposes to a mio poll loop.
pub trait Pollable {
    fn register(
        &mut self,
        registry: &mio::Registry,
        interest: mio::Interest,
        io_token: Token,
        child_token: Token,
    ) -> Result<(), SessionError>;

    fn reregister(
        &mut self,
        registry: &mio::Registry,
        interest: mio::Interest,
        io_token: Token,
        child_token: Token,
    ) -> Result<(), SessionError>;

    fn deregister(&mut self, registry: &mio::Registry) -> Result<(), SessionError>;
}

/// A session that can be driven by a poll loop.
pub trait PollableSession: Session + Pollable {}

impl<T: Session + Pollable> PollableSession for T {}
