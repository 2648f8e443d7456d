use utf8parse::Receiver;

struct Sink<'a> {
    out: &'a mut String,
}

impl Receiver for Sink<'_> {
    fn codepoint(&mut self, c: char) {
        self.out.push(c);
    }

    fn invalid_sequence(&mut self) {
        self.out.push(char::REPLACEMENT_CHARACTER);
    }
}

/// Incremental UTF-8 decoder for raw terminal output.
///
/// A multi-byte sequence cut by a read boundary is completed by the next
/// call instead of being replaced. Invalid input decodes to `U+FFFD`.
#[derive(Default)]
pub struct Utf8Decoder {
    inner: utf8parse::Parser,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len());
        let mut sink = Sink { out: &mut out };

        for &byte in bytes {
            self.inner.advance(&mut sink, byte);
        }

        out
    }
}
