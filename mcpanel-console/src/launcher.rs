use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use mcpanel_pty::{PollableSession, PtySize, unix};

use crate::command::{SshMode, remote_command, ssh_args};
use crate::error::{ConsoleError, Result};
use crate::target::TargetConfig;

/// ssh reserves this exit status for its own failures.
pub const SSH_FAILURE_STATUS: i32 = 255;

const QUERY_WAIT_STEP: Duration = Duration::from_millis(20);

pub type BoxedSession = Box<dyn PollableSession>;

/// Starts console connections and side queries for a target.
pub trait Launcher: Send + Sync {
    /// Start the interactive console with the terminal already sized.
    fn launch(&self, config: &TargetConfig, size: PtySize) -> Result<BoxedSession>;

    /// Run `command` on the target without a terminal and return its
    /// standard output.
    fn query(&self, config: &TargetConfig, command: &str) -> Result<String>;
}

/// Launches the system ssh client on a local pty.
#[derive(Debug, Clone)]
pub struct SshLauncher {
    connect_timeout: Duration,
}

impl SshLauncher {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Launcher for SshLauncher {
    fn launch(&self, config: &TargetConfig, size: PtySize) -> Result<BoxedSession> {
        let remote = remote_command(config)?;
        let args = ssh_args(
            config,
            remote.as_deref(),
            SshMode::Interactive,
            self.connect_timeout,
        );

        info!(
            "launching {} for {} ({:?})",
            config.ssh_program,
            config.destination(),
            config.wrapper
        );
        debug!("ssh arguments: {args:?}");

        let session = unix(&config.ssh_program)
            .with_args(&args)
            .with_env("TERM", "xterm-256color")
            .with_size(size)
            .spawn()
            .map_err(|err| ConsoleError::ConnectionFailed(err.to_string()))?;

        Ok(Box::new(session))
    }

    fn query(&self, config: &TargetConfig, command: &str) -> Result<String> {
        let args =
            ssh_args(config, Some(command), SshMode::Query, self.connect_timeout);

        let mut child = Command::new(&config.ssh_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ConsoleError::ConnectionFailed(format!(
                    "failed to spawn `{}`: {err}",
                    config.ssh_program
                ))
            })?;

        let stdout = child.stdout.take().map(read_in_background);
        let stderr = child.stderr.take().map(read_in_background);

        // Connect timeout plus the same again for the command itself.
        let deadline = Instant::now() + self.connect_timeout * 2;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConsoleError::Timeout);
            }
            thread::sleep(QUERY_WAIT_STEP);
        };

        let collect = |rx: Option<flume::Receiver<String>>| {
            rx.and_then(|rx| rx.recv().ok()).unwrap_or_default()
        };
        let stdout = collect(stdout);

        if status.code() == Some(SSH_FAILURE_STATUS) {
            let stderr = collect(stderr);
            return Err(ConsoleError::ConnectionFailed(
                stderr.trim().to_string(),
            ));
        }

        Ok(stdout)
    }
}

fn read_in_background<R>(mut reader: R) -> flume::Receiver<String>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = flume::bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}
