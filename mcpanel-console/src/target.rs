use std::fmt;

use mcpanel_pty::PtySize;
use serde::{Deserialize, Serialize};

const SSH_DEFAULT_PORT: u16 = 22;
const RCON_DEFAULT_PORT: u16 = 25575;

/// Key of a managed server in the console table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal multiplexer holding the server console on the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplexer {
    Screen,
    Tmux,
}

impl Multiplexer {
    pub fn program(self) -> &'static str {
        match self {
            Multiplexer::Screen => "screen",
            Multiplexer::Tmux => "tmux",
        }
    }
}

/// What runs on the remote side of the ssh connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperMode {
    /// Plain interactive login shell.
    #[default]
    Direct,
    /// Attach to the named screen session.
    Screen,
    /// Attach to the named tmux session.
    Tmux,
    /// Attach to the first screen session found.
    AutoScreen,
    /// Attach to the first tmux session found.
    AutoTmux,
    /// `mcwrap attach --raw` with a fallback command.
    Mcwrap,
}

impl WrapperMode {
    pub fn multiplexer(self) -> Option<Multiplexer> {
        match self {
            WrapperMode::Screen | WrapperMode::AutoScreen => {
                Some(Multiplexer::Screen)
            },
            WrapperMode::Tmux | WrapperMode::AutoTmux => Some(Multiplexer::Tmux),
            WrapperMode::Direct | WrapperMode::Mcwrap => None,
        }
    }

    /// Whether an early exit of the remote side means the attach failed
    /// rather than the connection.
    pub fn attaches(self) -> bool {
        !matches!(self, WrapperMode::Direct)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RconConfig {
    /// Defaults to the ssh host.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    pub password: String,
}

/// Connection settings of one managed server, as stored by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub wrapper: WrapperMode,
    #[serde(default)]
    pub session_name: Option<String>,
    /// Server directory handed to mcwrap.
    #[serde(default)]
    pub server_dir: Option<String>,
    /// Remote command used when mcwrap is not installed.
    #[serde(default)]
    pub fallback_command: Option<String>,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default)]
    pub rcon: Option<RconConfig>,
}

fn default_ssh_port() -> u16 {
    SSH_DEFAULT_PORT
}

fn default_rcon_port() -> u16 {
    RCON_DEFAULT_PORT
}

fn default_ssh_program() -> String {
    String::from("ssh")
}

fn default_rows() -> u16 {
    PtySize::default().rows
}

fn default_cols() -> u16 {
    PtySize::default().cols
}

impl TargetConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: SSH_DEFAULT_PORT,
            user: None,
            identity_file: None,
            ssh_program: default_ssh_program(),
            extra_args: Vec::new(),
            wrapper: WrapperMode::Direct,
            session_name: None,
            server_dir: None,
            fallback_command: None,
            rows: default_rows(),
            cols: default_cols(),
            rcon: None,
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn with_identity_file(mut self, path: &str) -> Self {
        self.identity_file = Some(path.to_string());
        self
    }

    pub fn with_ssh_program(mut self, program: &str) -> Self {
        self.ssh_program = program.to_string();
        self
    }

    pub fn with_extra_arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_string());
        self
    }

    pub fn with_wrapper(mut self, wrapper: WrapperMode) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn with_session_name(mut self, name: &str) -> Self {
        self.session_name = Some(name.to_string());
        self
    }

    pub fn with_server_dir(mut self, dir: &str) -> Self {
        self.server_dir = Some(dir.to_string());
        self
    }

    pub fn with_fallback_command(mut self, command: &str) -> Self {
        self.fallback_command = Some(command.to_string());
        self
    }

    pub fn with_size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn with_rcon(mut self, rcon: RconConfig) -> Self {
        self.rcon = Some(rcon);
        self
    }

    /// `user@host`, or just the host when no user is configured.
    pub fn destination(&self) -> String {
        match self
            .user
            .as_deref()
            .map(str::trim)
            .filter(|user| !user.is_empty())
        {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Session name, if set and not blank.
    pub fn session(&self) -> Option<&str> {
        self.session_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn size(&self) -> PtySize {
        PtySize::new(self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_minimal_json_when_parsed_then_defaults_are_filled() {
        let config = TargetConfig::from_json(r#"{"host": "mc.example.org"}"#)
            .expect("config should parse");

        assert_eq!(config.port, 22);
        assert_eq!(config.ssh_program, "ssh");
        assert_eq!(config.wrapper, WrapperMode::Direct);
        assert_eq!(config.size(), PtySize::new(24, 80));
        assert_eq!(config.destination(), "mc.example.org");
    }

    #[test]
    fn given_full_json_when_parsed_then_every_field_is_read() {
        let config = TargetConfig::from_json(
            r#"{
                "host": "10.0.0.5",
                "port": 2222,
                "user": "minecraft",
                "identityFile": "~/.ssh/panel",
                "extraArgs": ["-o", "StrictHostKeyChecking=no"],
                "wrapper": "auto_tmux",
                "sessionName": "survival",
                "rows": 50,
                "cols": 200,
                "rcon": {"password": "hunter2"}
            }"#,
        )
        .expect("config should parse");

        assert_eq!(config.destination(), "minecraft@10.0.0.5");
        assert_eq!(config.wrapper.multiplexer(), Some(Multiplexer::Tmux));
        assert_eq!(config.session(), Some("survival"));
        assert_eq!(config.size(), PtySize::new(50, 200));

        let rcon = config.rcon.expect("rcon should be set");
        assert_eq!(rcon.port, 25575);
        assert_eq!(rcon.host, None);
    }

    #[test]
    fn blank_user_and_session_are_ignored() {
        let config = TargetConfig::new("host")
            .with_user("  ")
            .with_session_name("");

        assert_eq!(config.destination(), "host");
        assert_eq!(config.session(), None);
    }
}
