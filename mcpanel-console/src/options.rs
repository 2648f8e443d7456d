use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Timing and buffer knobs shared by every console the manager owns.
///
/// Durations are read from JSON as milliseconds. Missing fields keep their
/// defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsoleOptions {
    /// How often the restart watchdog re-evaluates a console.
    #[serde(rename = "pollIntervalMs", deserialize_with = "millis")]
    pub poll_interval: Duration,
    /// Silence while nominally connected that forces a reattach during a
    /// restart.
    #[serde(rename = "staleAfterMs", deserialize_with = "millis")]
    pub stale_after: Duration,
    /// How recent the last output must be for a restart to count as
    /// recovered.
    #[serde(rename = "freshWithinMs", deserialize_with = "millis")]
    pub fresh_within: Duration,
    /// Overall bound of one restart watch.
    #[serde(rename = "watchdogTimeoutMs", deserialize_with = "millis")]
    pub watchdog_timeout: Duration,
    /// Passed to ssh as `ConnectTimeout` and used for side queries.
    #[serde(rename = "connectTimeoutMs", deserialize_with = "millis")]
    pub connect_timeout: Duration,
    /// Round trip bound for bridge requests.
    #[serde(rename = "requestTimeoutMs", deserialize_with = "millis")]
    pub request_timeout: Duration,
    /// How long a freshly attached wrapper may exit early and still be
    /// reported as a failed connect. Zero disables the check.
    #[serde(rename = "attachGraceMs", deserialize_with = "millis")]
    pub attach_grace: Duration,
    /// Size of the temporary buffer used to drain the pty.
    pub read_buffer_capacity: usize,
    /// Command name the server-side bridge listens on.
    pub request_command: String,
    /// Console commands that start the restart watchdog.
    pub restart_commands: Vec<String>,
    /// Query the multiplexer before attaching to a named session.
    pub verify_session: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(8),
            fresh_within: Duration::from_secs(3),
            watchdog_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            attach_grace: Duration::from_millis(750),
            read_buffer_capacity: 4096,
            request_command: String::from("mcpanel"),
            restart_commands: vec![String::from("restart"), String::from("stop")],
            verify_session: true,
        }
    }
}

impl ConsoleOptions {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    pub fn with_stale_after(mut self, value: Duration) -> Self {
        self.stale_after = value;
        self
    }

    pub fn with_fresh_within(mut self, value: Duration) -> Self {
        self.fresh_within = value;
        self
    }

    pub fn with_watchdog_timeout(mut self, value: Duration) -> Self {
        self.watchdog_timeout = value;
        self
    }

    pub fn with_connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = value;
        self
    }

    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_attach_grace(mut self, value: Duration) -> Self {
        self.attach_grace = value;
        self
    }

    pub fn with_read_buffer_capacity(mut self, value: usize) -> Self {
        self.read_buffer_capacity = value.max(1);
        self
    }

    pub fn with_request_command(mut self, value: &str) -> Self {
        self.request_command = value.to_string();
        self
    }

    pub fn with_restart_commands(mut self, commands: &[&str]) -> Self {
        self.restart_commands =
            commands.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_verify_session(mut self, value: bool) -> Self {
        self.verify_session = value;
        self
    }

    /// Whether `command`, as typed into the console, restarts or stops the
    /// server. Surrounding whitespace, a leading `/` and arguments are
    /// ignored.
    pub fn is_restart_command(&self, command: &str) -> bool {
        let trimmed = command.trim();
        let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
        let Some(name) = trimmed.split_whitespace().next() else {
            return false;
        };

        self.restart_commands
            .iter()
            .any(|known| known.eq_ignore_ascii_case(name))
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let options = ConsoleOptions::default();

        assert_eq!(options.stale_after, Duration::from_secs(8));
        assert_eq!(options.watchdog_timeout, Duration::from_secs(90));
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.request_command, "mcpanel");
    }

    #[test]
    fn json_overrides_only_given_fields() {
        let options = ConsoleOptions::from_json(
            r#"{"staleAfterMs": 2500, "restartCommands": ["reboot"]}"#,
        )
        .expect("options should parse");

        assert_eq!(options.stale_after, Duration::from_millis(2500));
        assert_eq!(options.restart_commands, vec!["reboot".to_string()]);
        assert_eq!(options.watchdog_timeout, Duration::from_secs(90));
        assert_eq!(options.read_buffer_capacity, 4096);
    }

    #[test]
    fn restart_commands_ignore_slash_case_and_arguments() {
        let options = ConsoleOptions::default();

        assert!(options.is_restart_command("restart"));
        assert!(options.is_restart_command("  /STOP now\r"));
        assert!(!options.is_restart_command("say restart"));
        assert!(!options.is_restart_command("restarting"));
        assert!(!options.is_restart_command("   "));
    }
}
