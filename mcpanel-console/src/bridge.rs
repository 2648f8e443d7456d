//! Request/response exchanges with the server-side bridge plugin.
//!
//! A request is the console command `<command> <base64-json>`. Sent through
//! the console, its response comes back as an inline frame in the output.
//! Sent through RCON, the response is a `MCPANEL:` line in the reply.

use std::time::{Duration, Instant};

use mcpanel_frame::{
    Frame, Request, RequestType, Response, encode_request, extract_line_frames,
};
use serde_json::Value;

use crate::error::{ConsoleError, Result};
use crate::hub::{ChannelRecvTimeoutError, Subscription};
use crate::options::ConsoleOptions;
use crate::rcon::RconClient;
use crate::target::TargetConfig;

/// Wait for the response with `id`, skipping every other message.
pub(crate) fn await_response(
    messages: &Subscription<Frame>,
    id: &str,
    timeout: Duration,
) -> Result<Response> {
    let deadline = Instant::now() + timeout;

    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(ConsoleError::Timeout);
        }

        match messages.recv_timeout(left) {
            Ok(Frame::Response(response)) if response.id == id => {
                return Ok(response);
            },
            Ok(_) => {},
            Err(ChannelRecvTimeoutError::Timeout) => {
                return Err(ConsoleError::Timeout);
            },
            Err(ChannelRecvTimeoutError::Disconnected) => {
                return Err(ConsoleError::NotConnected);
            },
        }
    }
}

/// Bridge requests carried over an RCON connection.
pub struct RconBridge {
    client: RconClient,
    command: String,
}

impl RconBridge {
    pub fn new(client: RconClient, command: &str) -> Self {
        Self {
            client,
            command: command.to_string(),
        }
    }

    /// Connect with the target's RCON settings. The RCON host defaults to
    /// the ssh host.
    pub fn connect(config: &TargetConfig, options: &ConsoleOptions) -> Result<Self> {
        let rcon = config.rcon.as_ref().ok_or_else(|| {
            ConsoleError::InvalidInput(String::from("target has no rcon settings"))
        })?;
        let host = rcon.host.as_deref().unwrap_or(&config.host);

        let client = RconClient::connect(
            host,
            rcon.port,
            &rcon.password,
            options.request_timeout,
        )?;

        Ok(Self::new(client, &options.request_command))
    }

    pub fn request(
        &mut self,
        kind: RequestType,
        payload: Option<Value>,
    ) -> Result<Response> {
        self.send(&Request::new(kind, payload))
    }

    pub fn send(&mut self, request: &Request) -> Result<Response> {
        let line = encode_request(&self.command, request)?;
        let reply = self.client.command(&line)?;

        extract_line_frames(&reply)
            .into_iter()
            .find_map(|frame| match frame {
                Frame::Response(response) if response.id == request.id => {
                    Some(response)
                },
                _ => None,
            })
            .ok_or_else(|| {
                ConsoleError::Rcon(String::from("reply carried no matching response"))
            })
    }
}
