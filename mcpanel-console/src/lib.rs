//! Remote Minecraft server consoles over ssh.
//!
//! A [`ConsoleManager`] keeps one console per target. Each connection runs
//! the ssh client on a local pty, optionally attached to a screen, tmux or
//! mcwrap session, and pumps its output through the frame extractor (bridge
//! messages) and the escape decoder (styled text). After a restart request a
//! watchdog keeps reattaching until the server is heard from again.

mod bridge;
mod command;
mod detect;
mod error;
mod event;
mod hub;
mod input;
mod launcher;
mod manager;
mod options;
mod pump;
mod rcon;
mod target;
mod watchdog;

pub use mcpanel_escape as escape;
pub use mcpanel_frame as frame;
pub use mcpanel_pty as pty;

pub use bridge::RconBridge;
pub use command::{SshMode, attach_by_name, auto_attach, mcwrap, remote_command, ssh_args};
pub use detect::{
    MultiplexerSession, detection_command, parse_detection, parse_screen_list,
    parse_tmux_list,
};
pub use error::{ConsoleError, Result};
pub use event::{
    ConsoleEvent, ConsoleStatus, Lifecycle, OutputChunk, ReattachReason,
};
pub use hub::{
    ChannelRecvError, ChannelRecvResult, ChannelRecvTimeoutError,
    ChannelRecvTimeoutResult, ChannelTryRecvError, ChannelTryRecvResult,
    Subscription,
};
pub use input::{NamedKey, control_byte};
pub use launcher::{BoxedSession, Launcher, SSH_FAILURE_STATUS, SshLauncher};
pub use manager::{ConsoleManager, OutputStream};
pub use options::ConsoleOptions;
pub use rcon::{Packet, RconClient};
pub use target::{Multiplexer, RconConfig, TargetConfig, TargetId, WrapperMode};
