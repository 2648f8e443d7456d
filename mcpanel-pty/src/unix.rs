//! Unix PTY backend that launches a client process (typically `ssh`) on a
//! freshly allocated pseudo terminal.

use std::env;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};

use log::{debug, warn};
use mio::Token;
use mio::unix::SourceFd;
use nix::libc;
use nix::pty::openpty;
use signal_hook::{
    SigId,
    low_level::{self, pipe},
};

use crate::{Pollable, PtySize, Session, SessionError};

/// Pseudo terminal session that owns the spawned child process.
pub struct UnixSession {
    master: File,
    child: Child,
    signal_pipe: UnixStream,
    signal_pipe_id: SigId,
    closed: Option<i32>,
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

impl Session for UnixSession {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        loop {
            match self.master.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    continue;
                },
                // Linux reports a hung-up pty master as EIO.
                Err(err) if err.raw_os_error() == Some(libc::EIO) => {
                    return Ok(0);
                },
                Err(err) => return Err(SessionError::IO(err)),
            }
        }
    }

    fn write(&mut self, input: &[u8]) -> Result<usize, SessionError> {
        loop {
            match self.master.write(input) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    continue;
                },
                Err(err) => return Err(SessionError::IO(err)),
            }
        }
    }

    /// Apply the size to the pty and notify the client process, so it can
    /// forward the change to the remote side.
    fn resize(&mut self, size: PtySize) -> Result<(), SessionError> {
        let size: libc::winsize = size.into();
        let res = unsafe {
            libc::ioctl(
                self.master.as_raw_fd(),
                libc::TIOCSWINSZ,
                &size as *const _,
            )
        };

        if res < 0 {
            return Err(SessionError::Resize(io::Error::last_os_error()));
        }

        if let Ok(pid) = i32::try_from(self.child.id()) {
            unsafe { libc::kill(pid, libc::SIGWINCH) };
        }

        Ok(())
    }

    fn close(&mut self) -> Result<i32, SessionError> {
        if let Some(code) = self.closed {
            return Ok(code);
        }

        low_level::unregister(self.signal_pipe_id);
        let code = self.terminate()?;
        self.closed = Some(code);
        Ok(code)
    }

    fn try_get_child_exit_status(&mut self) -> Result<Option<i32>, SessionError> {
        let mut tmp = [0u8; 64];
        match self.signal_pipe.read(&mut tmp) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(SessionError::IO(e)),
            _ => Ok(self.child.try_wait()?.map(exit_code)),
        }
    }
}

impl UnixSession {
    fn new(
        master: File,
        child: Child,
        signal_pipe: UnixStream,
        signal_pipe_id: SigId,
    ) -> Self {
        Self {
            master,
            child,
            signal_pipe,
            signal_pipe_id,
            closed: None,
        }
    }

    /// Process id of the client process.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn terminate(&mut self) -> Result<i32, SessionError> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(exit_code(status));
        }

        if let Ok(pid_raw) = i32::try_from(self.child.id()) {
            let result = unsafe { libc::kill(pid_raw, libc::SIGTERM) };
            if result == 0 {
                if let Some(status) = self.child.try_wait()? {
                    return Ok(exit_code(status));
                }
            } else {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    return Err(SessionError::IO(err));
                }
            }
        }

        match self.child.kill() {
            Ok(()) => (),
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => (),
            Err(err) => return Err(SessionError::IO(err)),
        }

        let status = self.child.wait()?;
        Ok(exit_code(status))
    }
}

impl Pollable for UnixSession {
    /// Register the PTY master and SIGCHLD notification pipe with Mio.
    fn register(
        &mut self,
        registry: &mio::Registry,
        interest: mio::Interest,
        io_token: Token,
        child_token: Token,
    ) -> Result<(), SessionError> {
        let master_fd = self.master.as_raw_fd();
        registry.register(&mut SourceFd(&master_fd), io_token, interest)?;

        let signal_pipe = self.signal_pipe.as_raw_fd();
        registry.register(
            &mut SourceFd(&signal_pipe),
            child_token,
            mio::Interest::READABLE,
        )?;

        Ok(())
    }

    fn reregister(
        &mut self,
        registry: &mio::Registry,
        interest: mio::Interest,
        io_token: Token,
        child_token: Token,
    ) -> Result<(), SessionError> {
        let master_fd = self.master.as_raw_fd();
        registry.reregister(&mut SourceFd(&master_fd), io_token, interest)?;

        let signal_pipe = self.signal_pipe.as_raw_fd();
        registry.reregister(
            &mut SourceFd(&signal_pipe),
            child_token,
            mio::Interest::READABLE,
        )?;

        Ok(())
    }

    fn deregister(&mut self, registry: &mio::Registry) -> Result<(), SessionError> {
        let master_fd = self.master.as_raw_fd();
        registry.deregister(&mut SourceFd(&master_fd))?;

        let signal_pipe = self.signal_pipe.as_raw_fd();
        registry.deregister(&mut SourceFd(&signal_pipe))?;

        Ok(())
    }
}

impl Drop for UnixSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close pty session: {err}");
        }
    }
}

/// Builder for launching a command attached to a pseudo terminal.
pub struct UnixSessionBuilder {
    program: String,
    cmd: Command,
    size: PtySize,
    work_dir: Option<PathBuf>,
    controlling_tty: bool,
}

/// Start building a Unix PTY session for the provided executable.
pub fn unix(program: &str) -> UnixSessionBuilder {
    UnixSessionBuilder {
        program: program.to_owned(),
        cmd: Command::new(program),
        size: PtySize::default(),
        work_dir: None,
        controlling_tty: true,
    }
}

impl UnixSessionBuilder {
    pub fn with_arg(mut self, arg: &str) -> Self {
        self.cmd.arg(arg);
        self
    }

    pub fn with_args(mut self, args: &[String]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    pub fn with_env_remove(mut self, key: &str) -> Self {
        self.cmd.env_remove(key);
        self
    }

    /// Size the pty has before the process starts.
    pub fn with_size(mut self, size: PtySize) -> Self {
        self.size = size;
        self
    }

    pub fn with_cwd(mut self, path: &Path) -> Self {
        self.work_dir = Some(path.to_path_buf());
        self
    }

    /// Whether the pty becomes the controlling terminal of the process.
    /// Enabled by default; without it the process never receives SIGWINCH
    /// from the kernel.
    pub fn with_controlling_tty(mut self, enabled: bool) -> Self {
        self.controlling_tty = enabled;
        self
    }

    /// Spawn the configured command and return a PTY session that can be
    /// registered with Mio.
    pub fn spawn(mut self) -> Result<UnixSession, SessionError> {
        let winsize: libc::winsize = self.size.into();
        let result = openpty(Some(&winsize), None)?;
        let master = File::from(result.master);
        let slave = File::from(result.slave);
        let raw_master = master.as_raw_fd();
        let raw_slave = slave.as_raw_fd();

        let work_dir = self.work_dir.take();
        let controlling_tty = self.controlling_tty;

        let stdin_slave = slave.try_clone()?;
        let stderr_slave = slave.try_clone()?;

        self.cmd.stdin(stdin_slave).stderr(stderr_slave).stdout(slave);

        unsafe {
            self.cmd.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }

                if let Some(dir) = &work_dir {
                    env::set_current_dir(dir)?;
                }

                if controlling_tty
                    && libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1
                {
                    return Err(io::Error::last_os_error());
                }

                for signo in &[
                    libc::SIGCHLD,
                    libc::SIGHUP,
                    libc::SIGINT,
                    libc::SIGQUIT,
                    libc::SIGTERM,
                    libc::SIGALRM,
                    libc::SIGWINCH,
                ] {
                    libc::signal(*signo, libc::SIG_DFL);
                }

                libc::close(raw_master);
                libc::close(raw_slave);

                Ok(())
            });
        }

        let (signal_pipe, signal_pipe_id) = register_signal_handler()?;

        let child = match self.cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                low_level::unregister(signal_pipe_id);
                return Err(SessionError::Spawn {
                    program: self.program,
                    source,
                });
            },
        };

        // The slave copies owned by `cmd` must go away, otherwise the master
        // never observes a hang-up after the child exits.
        drop(self.cmd);

        if let Err(err) = set_nonblocking(raw_master) {
            let mut session =
                UnixSession::new(master, child, signal_pipe, signal_pipe_id);
            let _ = session.close();
            return Err(err);
        }

        debug!("spawned `{}` on pty (pid {})", self.program, child.id());

        Ok(UnixSession::new(master, child, signal_pipe, signal_pipe_id))
    }
}

fn register_signal_handler() -> Result<(UnixStream, SigId), SessionError> {
    let (pipe_writer, pipe) = UnixStream::pair()?;
    let pipe_id = pipe::register(libc::SIGCHLD, pipe_writer)?;
    pipe.set_nonblocking(true)?;
    Ok((pipe, pipe_id))
}

fn set_nonblocking(raw_fd: i32) -> Result<(), SessionError> {
    unsafe {
        let flags = libc::fcntl(raw_fd, libc::F_GETFL, 0);
        let result =
            libc::fcntl(raw_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        if result != 0 {
            return Err(SessionError::IO(io::Error::last_os_error()));
        }

        Ok(())
    }
}
