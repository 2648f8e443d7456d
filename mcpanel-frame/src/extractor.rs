//! Separation of bridge frames from console text.
//!
//! Frames arrive inside the same byte stream as regular console output and
//! can be cut anywhere by read boundaries. [`split`] handles one chunk and
//! reports what could not be decided yet; [`FrameExtractor`] carries that
//! remainder into the next chunk.

use log::{debug, warn};

use crate::codec::{FRAME_PREFIX, FRAME_SUFFIX, LINE_PREFIX, decode_payload};
use crate::message::Frame;

/// Upper bound for text held back while waiting for a frame terminator.
pub const DEFAULT_MAX_PENDING: usize = 1 << 20;

/// Result of scanning one chunk.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Split {
    /// Display text with every complete frame removed.
    pub text: String,
    /// Frames in input order. Malformed frames are dropped.
    pub frames: Vec<Frame>,
    /// Undecided tail: an open frame without terminator, or a trailing
    /// proper prefix of the frame marker.
    pub remainder: String,
}

/// Display text and frames produced by [`FrameExtractor::feed`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub frames: Vec<Frame>,
}

/// Scans `input` for frames, holding back anything that may still turn out
/// to be part of a frame.
pub fn split(input: &str) -> Split {
    let mut out = Split::default();
    let rest = scan(input, &mut out.text, &mut out.frames);

    match rest {
        Tail::Open(open) => out.remainder.push_str(open),
        Tail::Done(done) => {
            let hold = partial_prefix_len(done);
            let (text, held) = done.split_at(done.len() - hold);
            out.text.push_str(text);
            out.remainder.push_str(held);
        },
    }

    out
}

/// Extracts every complete frame from finished text. An unterminated frame
/// is left in the returned text as is.
pub fn extract_all(input: &str) -> (String, Vec<Frame>) {
    let mut text = String::with_capacity(input.len());
    let mut frames = Vec::new();

    match scan(input, &mut text, &mut frames) {
        Tail::Open(rest) | Tail::Done(rest) => text.push_str(rest),
    }

    (text, frames)
}

/// Removes every complete frame span from `input`.
///
/// Removing a span can join the text around it into a new span, so the
/// removal is repeated until nothing matches; applying `filter` to its own
/// output is therefore a no-op.
pub fn filter(input: &str) -> String {
    let mut current = input.to_owned();

    loop {
        let (next, removed) = strip_spans(&current);
        if removed == 0 {
            return next;
        }
        current = next;
    }
}

fn strip_spans(input: &str) -> (String, usize) {
    let mut text = String::with_capacity(input.len());
    let mut rest = input;
    let mut removed = 0;

    while let Some(start) = rest.find(FRAME_PREFIX) {
        let body = &rest[start + FRAME_PREFIX.len()..];
        let Some(end) = body.find(FRAME_SUFFIX) else {
            break;
        };

        text.push_str(&rest[..start]);
        rest = &body[end + FRAME_SUFFIX.len_utf8()..];
        removed += 1;
    }

    text.push_str(rest);
    (text, removed)
}

/// Decodes every `MCPANEL:<base64>` line frame found in `text`.
///
/// The payload runs to the next newline or the end of the text. Malformed
/// payloads are skipped.
pub fn extract_line_frames(text: &str) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(LINE_PREFIX) {
        let body = &rest[start + LINE_PREFIX.len()..];
        let end = body.find('\n').unwrap_or(body.len());

        match decode_payload(&body[..end]) {
            Ok(frame) => frames.push(frame),
            Err(err) => debug!("dropping malformed line frame: {err}"),
        }

        rest = &body[end..];
    }

    frames
}

enum Tail<'a> {
    /// Starts with a frame prefix that has no terminator yet.
    Open(&'a str),
    /// Contains no frame prefix.
    Done(&'a str),
}

fn scan<'a>(input: &'a str, text: &mut String, frames: &mut Vec<Frame>) -> Tail<'a> {
    let mut rest = input;

    loop {
        let Some(start) = rest.find(FRAME_PREFIX) else {
            return Tail::Done(rest);
        };

        let body = &rest[start + FRAME_PREFIX.len()..];
        let Some(end) = body.find(FRAME_SUFFIX) else {
            text.push_str(&rest[..start]);
            return Tail::Open(&rest[start..]);
        };

        text.push_str(&rest[..start]);
        match decode_payload(&body[..end]) {
            Ok(frame) => frames.push(frame),
            Err(err) => debug!("dropping malformed frame: {err}"),
        }

        rest = &body[end + FRAME_SUFFIX.len_utf8()..];
    }
}

/// Length of the longest proper prefix of the frame marker `text` ends with.
fn partial_prefix_len(text: &str) -> usize {
    (1..FRAME_PREFIX.len())
        .rev()
        .find(|&len| text.ends_with(&FRAME_PREFIX[..len]))
        .unwrap_or(0)
}

/// Stateful extractor for a continuous stream.
///
/// Keeps at most one pending fragment and prepends it to the next chunk.
#[derive(Debug)]
pub struct FrameExtractor {
    pending: String,
    max_pending: usize,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            pending: String::new(),
            max_pending,
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Extracted {
        let split = if self.pending.is_empty() {
            split(chunk)
        } else {
            let mut input = std::mem::take(&mut self.pending);
            input.push_str(chunk);
            split(&input)
        };

        let Split {
            mut text,
            frames,
            remainder,
        } = split;

        if remainder.len() > self.max_pending {
            warn!(
                "unterminated frame exceeded {} bytes, releasing it as text",
                self.max_pending
            );
            text.push_str(&remainder);
        } else {
            self.pending = remainder;
        }

        Extracted { text, frames }
    }

    /// Text currently held back.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Ends the stream and returns whatever was held back as plain text.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }
}
