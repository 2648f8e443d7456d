//! Listing of multiplexer sessions running on a target.

use serde::Serialize;

use crate::target::Multiplexer;

const TMUX_MARKER: &str = "--mcpanel-tmux--";

/// One command listing screen sessions, then tmux sessions, separated by a
/// marker line. Missing multiplexers just list nothing.
pub fn detection_command() -> String {
    format!(
        "screen -ls 2>/dev/null; echo '{TMUX_MARKER}'; \
         tmux list-sessions -F '#{{session_name}} #{{session_attached}}' 2>/dev/null; true"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplexerSession {
    pub multiplexer: Multiplexer,
    pub name: String,
    /// Screen only.
    pub pid: Option<u32>,
    pub attached: bool,
}

/// Parse the output of [`detection_command`].
pub fn parse_detection(output: &str) -> Vec<MultiplexerSession> {
    let (screen, tmux) = match output.split_once(TMUX_MARKER) {
        Some((screen, tmux)) => (screen, tmux),
        None => (output, ""),
    };

    let mut sessions = parse_screen_list(screen);
    sessions.extend(parse_tmux_list(tmux));
    sessions
}

/// Parse `screen -ls`. Session lines look like
/// `\t12345.name\t(date)\t(Detached)`.
pub fn parse_screen_list(output: &str) -> Vec<MultiplexerSession> {
    output
        .lines()
        .filter(|line| line.starts_with(char::is_whitespace))
        .filter_map(|line| {
            let id = line.split_whitespace().next()?;
            let (pid, name) = id.split_once('.')?;
            let pid = pid.parse::<u32>().ok()?;
            if name.is_empty() {
                return None;
            }

            Some(MultiplexerSession {
                multiplexer: Multiplexer::Screen,
                name: name.to_string(),
                pid: Some(pid),
                attached: line.contains("Attached") || line.contains("attached"),
            })
        })
        .collect()
}

/// Parse `tmux list-sessions -F '#{session_name} #{session_attached}'`.
pub fn parse_tmux_list(output: &str) -> Vec<MultiplexerSession> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let (name, attached) = line.rsplit_once(' ')?;
            let clients = attached.trim().parse::<u32>().ok()?;

            Some(MultiplexerSession {
                multiplexer: Multiplexer::Tmux,
                name: name.to_string(),
                pid: None,
                attached: clients > 0,
            })
        })
        .collect()
}
