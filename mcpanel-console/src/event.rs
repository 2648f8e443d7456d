use std::time::Instant;

use mcpanel_escape::StyledRun;
use mcpanel_pty::PtySize;

use crate::target::WrapperMode;

/// Visible console output read in one go, frames already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Display text with its escape sequences intact.
    pub text: String,
    /// The same text decoded into styled runs.
    pub runs: Vec<StyledRun>,
}

impl OutputChunk {
    /// Text with every escape sequence removed.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Why the watchdog replaced a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReattachReason {
    /// The connection was gone.
    Lost,
    /// The connection stayed up but went silent.
    Stale,
}

/// Lifecycle notifications of one console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Connecting,
    /// A new connection is live. Output subscriptions taken before this
    /// belong to the previous connection.
    Connected,
    Disconnected {
        exit_code: Option<i32>,
    },
    Resized(PtySize),
    RestartStarted,
    Reattaching(ReattachReason),
    RestartFinished {
        recovered: bool,
    },
}

/// Point-in-time view of a console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleStatus {
    pub lifecycle: Lifecycle,
    pub wrapper: WrapperMode,
    pub session_name: Option<String>,
    pub size: PtySize,
    pub connected_at: Option<Instant>,
    pub last_output_at: Option<Instant>,
    pub restarting: bool,
    pub restart_requested_at: Option<Instant>,
}

impl ConsoleStatus {
    pub fn is_connected(&self) -> bool {
        self.lifecycle == Lifecycle::Connected
    }
}
