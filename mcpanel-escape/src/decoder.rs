//! Streaming translation of console text into styled runs.
//!
//! The [`Decoder`] is not a terminal emulator: it keeps no screen and no
//! cursor. Control sequences other than SGR are parsed and absorbed so they
//! never leak into the visible text. Parser and style state survive between
//! [`Decoder::process`] calls, so sequences split across chunks are handled.

use log::debug;
use mcpanel_vte::{Actor, Parser};
use serde::{Deserialize, Serialize};

use crate::sgr::apply_sgr;
use crate::style::Style;

/// A piece of text printed with a single style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledRun {
    pub text: String,
    pub style: Style,
}

#[derive(Default)]
struct Performer {
    style: Style,
    text: String,
    runs: Vec<StyledRun>,
}

impl Performer {
    fn flush(&mut self) {
        if self.text.is_empty() {
            return;
        }

        self.runs.push(StyledRun {
            text: std::mem::take(&mut self.text),
            style: self.style,
        });
    }
}

impl Actor for Performer {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.text.push('\n'),
            b'\t' => self.text.push('\t'),
            _ => {},
        }
    }

    fn csi_dispatch(
        &mut self,
        params: &[u16],
        intermediates: &[u8],
        marker: Option<u8>,
        action: char,
    ) {
        if action != 'm' || marker.is_some() || !intermediates.is_empty() {
            debug!(
                "absorbed csi: params={params:?} intermediates={intermediates:?} marker={marker:?} action={action:?}"
            );
            return;
        }

        let mut next = self.style;
        apply_sgr(&mut next, params);

        if next != self.style {
            self.flush();
            self.style = next;
        }
    }
}

#[derive(Default)]
pub struct Decoder {
    parser: Parser,
    performer: Performer,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `text` and returns the runs completed by it, in input order.
    ///
    /// Text printed at the end of the chunk is returned as well; a following
    /// call starts a new run even when the style did not change.
    pub fn process(&mut self, text: &str) -> Vec<StyledRun> {
        self.parser.advance(text, &mut self.performer);
        self.performer.flush();
        std::mem::take(&mut self.performer.runs)
    }

    /// Style that applies to the next printed character.
    pub fn style(&self) -> &Style {
        &self.performer.style
    }

    /// SGR sequence that recreates the current style.
    pub fn export_state(&self) -> String {
        self.performer.style.to_sgr()
    }

    /// Forgets any partial sequence and the current style.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.performer = Performer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorSpec, NamedColor, Palette, Rgb};
    use crate::style::Flags;

    fn text_of(runs: &[StyledRun]) -> String {
        runs.iter().map(|run| run.text.as_str()).collect()
    }

    #[test]
    fn red_text_then_reset() {
        let mut decoder = Decoder::new();

        let runs = decoder.process("\x1b[31mHello \x1b[0m");

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Hello ");
        assert_eq!(
            runs[0].style.foreground,
            Some(ColorSpec::Named(NamedColor::Red))
        );
        assert!(decoder.style().is_default());
    }

    #[test]
    fn palette_index_is_kept_raw() {
        let mut decoder = Decoder::new();

        let runs = decoder.process("\x1b[38;5;208mX");

        assert_eq!(runs[0].style.foreground, Some(ColorSpec::Indexed(208)));
    }

    #[test]
    fn palette_indexes_resolve_to_rgb() {
        let mut decoder = Decoder::new();
        let palette = Palette::default();

        let runs = decoder.process("\x1b[38;5;208mX\x1b[48;5;244mY");

        assert_eq!(runs.len(), 2);
        let first = runs[0].style.effective_colors(&palette);
        assert_eq!(first.foreground, Rgb::new(255, 135, 0));
        assert_eq!(first.background, None);

        let second = runs[1].style.effective_colors(&palette);
        assert_eq!(second.foreground, Rgb::new(255, 135, 0));
        assert_eq!(second.background, Some(Rgb::new(128, 128, 128)));
    }

    #[test]
    fn truecolor_is_kept_raw() {
        let mut decoder = Decoder::new();

        let runs = decoder.process("\x1b[38;2;10;20;30mY");

        assert_eq!(
            runs[0].style.foreground,
            Some(ColorSpec::TrueColor(Rgb::new(10, 20, 30)))
        );
    }

    #[test]
    fn control_and_escape_content_is_removed() {
        let mut decoder = Decoder::new();
        let input = "a\r\n\x1b[2J\x1b[?25lb\x1b]0;title\x07\tc\x08\x1b(Bd";

        let runs = decoder.process(input);

        assert_eq!(text_of(&runs), "a\nb\tcd");
    }

    const STRIPPED: &[(&str, &str)] = &[
        ("a\x1b[1;31mb\x1b[0mc", "abc"),
        ("a\x1b[?1049h\x1b[2;5Hb", "ab"),
        ("a\x1b]0;title\x07b", "ab"),
        ("a\x1b]2;title\x1b\\b", "ab"),
        ("a\x1bPq#0;2;0;0;0\x1b\\b", "ab"),
        ("a\x1bXstart of string\x1b\\b", "ab"),
        ("a\x1b^privacy\x1b\\b", "ab"),
        ("a\x1b_application\x1b\\b", "ab"),
        ("a\u{9b}32mb\u{9b}0mc", "abc"),
        ("a\u{9d}8;;https://example.org\u{9c}b", "ab"),
        ("a\u{90}1$r\u{9c}b", "ab"),
        ("a\u{98}sos\u{9c}b", "ab"),
        ("a\x1b[31\x18b\x1b[4\x1ac", "abc"),
        ("a\x1b]0;cut\x18b", "ab"),
        ("x\ty\r\nz\x07\x08\x7f", "x\ty\nz"),
        ("\u{e9}\x1b[1m\u{65e5}\u{672c}", "\u{e9}\u{65e5}\u{672c}"),
    ];

    #[test]
    fn run_text_is_input_without_control_content() {
        for (input, expected) in STRIPPED {
            let mut decoder = Decoder::new();
            let runs = decoder.process(input);

            assert_eq!(&text_of(&runs), expected, "input {input:?}");
        }
    }

    #[test]
    fn run_text_survives_one_char_chunks() {
        for (input, expected) in STRIPPED {
            let mut decoder = Decoder::new();
            let mut buf = [0u8; 4];
            let text: String = input
                .chars()
                .flat_map(|c| decoder.process(c.encode_utf8(&mut buf)))
                .map(|run| run.text)
                .collect();

            assert_eq!(&text, expected, "input {input:?}");
        }
    }

    #[test]
    fn style_changes_split_runs() {
        let mut decoder = Decoder::new();

        let runs = decoder.process("plain\x1b[1mbold\x1b[1mstill\x1b[22mplain");

        let texts: Vec<&str> = runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["plain", "boldstill", "plain"]);
        assert_eq!(runs[1].style.flags, Flags::BOLD);
        assert!(runs[2].style.is_default());
    }

    #[test]
    fn sequence_split_between_chunks_keeps_style() {
        let mut decoder = Decoder::new();

        let first = decoder.process("x\x1b[3");
        let second = decoder.process("2my");

        assert_eq!(text_of(&first), "x");
        assert_eq!(second.len(), 1);
        assert_eq!(
            second[0].style.foreground,
            Some(ColorSpec::Named(NamedColor::Green))
        );
    }

    #[test]
    fn exported_state_restores_style() {
        let mut decoder = Decoder::new();
        decoder.process("\x1b[1;3;38;5;100;44m");

        let mut fresh = Decoder::new();
        fresh.process(&decoder.export_state());

        assert_eq!(fresh.style(), decoder.style());
    }

    #[test]
    fn arbitrary_input_never_panics() {
        let mut decoder = Decoder::new();
        let noise: String = (0u32..0x3000)
            .step_by(7)
            .filter_map(char::from_u32)
            .collect();

        let runs = decoder.process(&noise);

        assert!(runs.iter().all(|run| !run.text.is_empty()));
    }

    #[test]
    fn reset_drops_partial_sequence() {
        let mut decoder = Decoder::new();
        decoder.process("\x1b[31mred\x1b[");

        decoder.reset();
        let runs = decoder.process("ok");

        assert_eq!(text_of(&runs), "ok");
        assert!(runs[0].style.is_default());
    }
}
