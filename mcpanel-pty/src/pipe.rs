//! In-process session backed by a socket pair.
//!
//! The [`PipeSession`] side behaves like a pty session for the poll loop,
//! while the [`PipePeer`] side plays the remote console: what the peer writes
//! is read as console output, and input written to the session arrives at the
//! peer. Hanging up the peer ends the session with exit code `0`.

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mio::Token;
use mio::unix::SourceFd;

use crate::{Pollable, PtySize, Session, SessionError};

type Resizes = Arc<Mutex<Vec<PtySize>>>;

pub struct PipeSession {
    stream: UnixStream,
    resizes: Resizes,
    eof: bool,
    exit_reported: bool,
    closed: bool,
}

pub struct PipePeer {
    stream: UnixStream,
    resizes: Resizes,
}

/// Create a connected session/peer pair. `size` is recorded as the first
/// size the "terminal" was given.
pub fn pipe(size: PtySize) -> Result<(PipeSession, PipePeer), SessionError> {
    let (local, remote) = UnixStream::pair()?;
    local.set_nonblocking(true)?;

    let resizes = Arc::new(Mutex::new(vec![size]));

    Ok((
        PipeSession {
            stream: local,
            resizes: resizes.clone(),
            eof: false,
            exit_reported: false,
            closed: false,
        },
        PipePeer {
            stream: remote,
            resizes,
        },
    ))
}

impl Session for PipeSession {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        loop {
            match self.stream.read(buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                },
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    continue;
                },
                Err(err) => return Err(SessionError::IO(err)),
            }
        }
    }

    fn write(&mut self, input: &[u8]) -> Result<usize, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        loop {
            match self.stream.write(input) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    continue;
                },
                Err(err) => return Err(SessionError::IO(err)),
            }
        }
    }

    fn resize(&mut self, size: PtySize) -> Result<(), SessionError> {
        if let Ok(mut resizes) = self.resizes.lock() {
            resizes.push(size);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<i32, SessionError> {
        if !self.closed {
            self.closed = true;
            match self.stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => {},
                Err(err) if err.kind() == io::ErrorKind::NotConnected => {},
                Err(err) => return Err(SessionError::IO(err)),
            }
        }

        Ok(0)
    }

    fn try_get_child_exit_status(&mut self) -> Result<Option<i32>, SessionError> {
        if self.eof && !self.exit_reported {
            self.exit_reported = true;
            return Ok(Some(0));
        }

        Ok(None)
    }
}

impl Pollable for PipeSession {
    fn register(
        &mut self,
        registry: &mio::Registry,
        interest: mio::Interest,
        io_token: Token,
        _child_token: Token,
    ) -> Result<(), SessionError> {
        let fd = self.stream.as_raw_fd();
        registry.register(&mut SourceFd(&fd), io_token, interest)?;
        Ok(())
    }

    fn reregister(
        &mut self,
        registry: &mio::Registry,
        interest: mio::Interest,
        io_token: Token,
        _child_token: Token,
    ) -> Result<(), SessionError> {
        let fd = self.stream.as_raw_fd();
        registry.reregister(&mut SourceFd(&fd), io_token, interest)?;
        Ok(())
    }

    fn deregister(&mut self, registry: &mio::Registry) -> Result<(), SessionError> {
        let fd = self.stream.as_raw_fd();
        registry.deregister(&mut SourceFd(&fd))?;
        Ok(())
    }
}

impl PipePeer {
    /// Write console output towards the session.
    pub fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    /// Read session input until `needle` shows up, the session hangs up or
    /// `timeout` elapses. Returns everything read so far.
    pub fn read_until(
        &mut self,
        needle: &[u8],
        timeout: Duration,
    ) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        let mut buf = [0u8; 1024];

        while !contains(&collected, needle) {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }

            self.stream.set_read_timeout(Some(left))?;
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    break;
                },
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {},
                Err(err) => return Err(err),
            }
        }

        Ok(collected)
    }

    /// Whether the session side closed its end.
    pub fn is_hung_up(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut buf = [0u8; 256];
        self.stream.set_read_timeout(Some(timeout))?;

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Ok(true),
                Ok(_) => continue,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(false);
                },
                Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {
                    return Ok(true);
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Every size the session was given, starting with the initial one.
    pub fn resizes(&self) -> Vec<PtySize> {
        self.resizes.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_some(session: &mut PipeSession) -> Vec<u8> {
        let mut buf = [0u8; 256];
        for _ in 0..100 {
            match session.read(&mut buf) {
                Ok(n) => return buf[..n].to_vec(),
                Err(err) if err.is_would_block() => {
                    std::thread::sleep(Duration::from_millis(5));
                },
                Err(err) => panic!("unexpected read error: {err}"),
            }
        }
        Vec::new()
    }

    #[test]
    fn peer_output_is_session_input_and_back() {
        let (mut session, mut peer) =
            pipe(PtySize::default()).expect("pipe should open");

        peer.write_output(b"hello").expect("peer should write");
        assert_eq!(read_some(&mut session), b"hello");

        session.write(b"list\r").expect("session should write");
        let input = peer
            .read_until(b"\r", Duration::from_secs(1))
            .expect("peer should read");
        assert_eq!(input, b"list\r");
    }

    #[test]
    fn peer_hang_up_reports_exit_once() {
        let (mut session, peer) =
            pipe(PtySize::default()).expect("pipe should open");
        drop(peer);

        assert_eq!(read_some(&mut session), b"");
        assert_eq!(
            session.try_get_child_exit_status().expect("status"),
            Some(0)
        );
        assert_eq!(session.try_get_child_exit_status().expect("status"), None);
    }

    #[test]
    fn resizes_are_recorded_in_order() {
        let (mut session, peer) =
            pipe(PtySize::new(10, 40)).expect("pipe should open");

        session.resize(PtySize::new(50, 200)).expect("resize");

        assert_eq!(
            peer.resizes(),
            vec![PtySize::new(10, 40), PtySize::new(50, 200)]
        );
    }

    #[test]
    fn closed_session_hangs_up_peer() {
        let (mut session, mut peer) =
            pipe(PtySize::default()).expect("pipe should open");

        assert_eq!(session.close().expect("close"), 0);

        assert!(peer.is_hung_up(Duration::from_secs(1)).expect("peer read"));
        assert!(matches!(session.write(b"x"), Err(SessionError::Closed)));
    }
}
