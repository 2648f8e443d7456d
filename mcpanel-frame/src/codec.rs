use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::FrameError;
use crate::message::{Frame, Request};

/// Opening marker of a frame embedded in console output.
pub const FRAME_PREFIX: &str = "\x1b]1337;MCPanel:";
/// Closing marker of a frame embedded in console output (BEL).
pub const FRAME_SUFFIX: char = '\x07';
/// Marker of a frame carried on its own line, as RCON replies do.
pub const LINE_PREFIX: &str = "MCPANEL:";

/// Decodes the base64 JSON body found between the frame markers.
pub fn decode_payload(body: &str) -> Result<Frame, FrameError> {
    let json = STANDARD.decode(body.trim())?;
    Ok(serde_json::from_slice(&json)?)
}

fn encode_payload<T: serde::Serialize>(value: &T) -> Result<String, FrameError> {
    let json = serde_json::to_vec(value)?;
    Ok(STANDARD.encode(json))
}

/// Encodes a frame the way the bridge writes it to the console, including
/// the trailing newline.
pub fn encode_frame(frame: &Frame) -> Result<String, FrameError> {
    let body = encode_payload(frame)?;
    Ok(format!("{FRAME_PREFIX}{body}{FRAME_SUFFIX}\n"))
}

/// Encodes a frame as a single `MCPANEL:<base64>` line without newline.
pub fn encode_line(frame: &Frame) -> Result<String, FrameError> {
    let body = encode_payload(frame)?;
    Ok(format!("{LINE_PREFIX}{body}"))
}

/// Encodes a request as the console command `<command> <base64-json>`.
pub fn encode_request(
    command: &str,
    request: &Request,
) -> Result<String, FrameError> {
    let body = encode_payload(request)?;
    Ok(format!("{command} {body}"))
}

/// Decodes a request line produced by [`encode_request`].
///
/// A leading `/` is accepted, as players type commands that way.
pub fn decode_request(line: &str, command: &str) -> Result<Request, FrameError> {
    let line = line.trim();
    let line = line.strip_prefix('/').unwrap_or(line);

    let body = line
        .strip_prefix(command)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| FrameError::MissingCommand(command.to_owned()))?;

    let json = STANDARD.decode(body.trim())?;
    Ok(serde_json::from_slice(&json)?)
}
