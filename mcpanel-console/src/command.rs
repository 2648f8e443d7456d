//! Remote command lines and ssh argument vectors.

use std::time::Duration;

use crate::error::{ConsoleError, Result};
use crate::target::{Multiplexer, TargetConfig, WrapperMode};

const LOGIN_SHELL: &str = "exec \"${SHELL:-/bin/sh}\" -l";
const SERVER_ALIVE_INTERVAL_SECS: u64 = 15;

/// How ssh is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshMode {
    /// Forced remote tty, the console itself.
    Interactive,
    /// No tty and no prompts, for side queries.
    Query,
}

/// Command the remote login shell runs for the configured wrapper, or
/// `None` for a plain interactive shell.
pub fn remote_command(config: &TargetConfig) -> Result<Option<String>> {
    match config.wrapper {
        WrapperMode::Direct => Ok(None),
        WrapperMode::Screen | WrapperMode::Tmux => {
            let name = config.session().ok_or_else(|| {
                ConsoleError::InvalidInput(String::from(
                    "attaching by name needs a session name",
                ))
            })?;
            let multiplexer = match config.wrapper {
                WrapperMode::Screen => Multiplexer::Screen,
                _ => Multiplexer::Tmux,
            };
            Ok(Some(attach_by_name(multiplexer, name)))
        },
        WrapperMode::AutoScreen => Ok(Some(auto_attach(Multiplexer::Screen))),
        WrapperMode::AutoTmux => Ok(Some(auto_attach(Multiplexer::Tmux))),
        WrapperMode::Mcwrap => {
            let dir = config
                .server_dir
                .as_deref()
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .ok_or_else(|| {
                    ConsoleError::InvalidInput(String::from(
                        "mcwrap needs a server directory",
                    ))
                })?;
            Ok(Some(mcwrap(dir, &mcwrap_fallback(config))))
        },
    }
}

/// Attach to `name`, sharing it with other clients when possible and
/// stealing it from a stale client otherwise.
pub fn attach_by_name(multiplexer: Multiplexer, name: &str) -> String {
    let name = shell_words::quote(name);
    match multiplexer {
        Multiplexer::Screen => {
            format!("screen -x {name} || screen -d -r {name}")
        },
        Multiplexer::Tmux => format!(
            "tmux attach-session -t {name} || tmux attach-session -d -t {name}"
        ),
    }
}

/// Attach to whichever session the multiplexer picks. When none can be
/// attached the session list is printed, so the caller sees the choices.
pub fn auto_attach(multiplexer: Multiplexer) -> String {
    match multiplexer {
        Multiplexer::Screen => String::from(
            "screen -x 2>/dev/null || screen -d -r 2>/dev/null || screen -ls",
        ),
        Multiplexer::Tmux => String::from(
            "tmux attach-session 2>/dev/null || tmux list-sessions",
        ),
    }
}

pub fn mcwrap(server_dir: &str, fallback: &str) -> String {
    format!(
        "mcwrap attach --raw {} 2>/dev/null || {fallback}",
        shell_words::quote(server_dir)
    )
}

fn mcwrap_fallback(config: &TargetConfig) -> String {
    if let Some(command) = config
        .fallback_command
        .as_deref()
        .map(str::trim)
        .filter(|command| !command.is_empty())
    {
        return command.to_string();
    }

    match config.session() {
        Some(name) => format!("screen -x {}", shell_words::quote(name)),
        None => String::from(LOGIN_SHELL),
    }
}

/// Arguments for the ssh client (program excluded).
pub fn ssh_args(
    config: &TargetConfig,
    remote: Option<&str>,
    mode: SshMode,
    connect_timeout: Duration,
) -> Vec<String> {
    let mut args = Vec::new();

    // No password or host key prompts in either mode; ssh exits with 255.
    match mode {
        SshMode::Interactive => args.push(String::from("-tt")),
        SshMode::Query => args.push(String::from("-T")),
    }
    args.push(String::from("-o"));
    args.push(String::from("BatchMode=yes"));
    args.push(String::from("-o"));
    args.push(format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)));
    args.push(String::from("-o"));
    args.push(format!("ServerAliveInterval={SERVER_ALIVE_INTERVAL_SECS}"));
    args.push(String::from("-p"));
    args.push(config.port.to_string());

    if let Some(identity) = config
        .identity_file
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
    {
        args.push(String::from("-i"));
        args.push(identity.to_string());
    }

    args.extend(config.extra_args.iter().cloned());
    args.push(config.destination());

    if let Some(remote) = remote {
        args.push(remote.to_string());
    }

    args
}
