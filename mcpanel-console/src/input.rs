use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConsoleError;

/// Keys a console view can send besides text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedKey {
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Tab,
    Escape,
    Backspace,
    Delete,
}

impl NamedKey {
    /// Bytes a VT100-compatible terminal sends for the key.
    pub fn sequence(self) -> &'static str {
        match self {
            NamedKey::Up => "\x1b[A",
            NamedKey::Down => "\x1b[B",
            NamedKey::Right => "\x1b[C",
            NamedKey::Left => "\x1b[D",
            NamedKey::Home => "\x1b[H",
            NamedKey::End => "\x1b[F",
            NamedKey::PageUp => "\x1b[5~",
            NamedKey::PageDown => "\x1b[6~",
            NamedKey::Tab => "\t",
            NamedKey::Escape => "\x1b",
            NamedKey::Backspace => "\x7f",
            NamedKey::Delete => "\x1b[3~",
        }
    }
}

impl FromStr for NamedKey {
    type Err = ConsoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = match value.trim().to_ascii_lowercase().as_str() {
            "up" | "arrowup" => NamedKey::Up,
            "down" | "arrowdown" => NamedKey::Down,
            "right" | "arrowright" => NamedKey::Right,
            "left" | "arrowleft" => NamedKey::Left,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" | "page_up" | "pgup" => NamedKey::PageUp,
            "pagedown" | "page_down" | "pgdn" => NamedKey::PageDown,
            "tab" => NamedKey::Tab,
            "escape" | "esc" => NamedKey::Escape,
            "backspace" => NamedKey::Backspace,
            "delete" | "del" => NamedKey::Delete,
            other => {
                return Err(ConsoleError::InvalidInput(format!(
                    "unknown key `{other}`"
                )));
            },
        };

        Ok(key)
    }
}

/// Control character for `Ctrl+<key>`: `c` gives `0x03`, `[` gives ESC.
pub fn control_byte(key: char) -> Result<u8, ConsoleError> {
    match key.to_ascii_uppercase() {
        c @ ('@'..='_') => Ok(c as u8 & 0x1f),
        '?' => Ok(0x7f),
        _ => Err(ConsoleError::InvalidInput(format!(
            "no control character for `{key}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_use_normal_cursor_mode() {
        assert_eq!(NamedKey::Up.sequence(), "\x1b[A");
        assert_eq!(NamedKey::Left.sequence(), "\x1b[D");
        assert_eq!(NamedKey::PageDown.sequence(), "\x1b[6~");
        assert_eq!(NamedKey::Backspace.sequence(), "\x7f");
    }

    #[test]
    fn key_names_parse_case_insensitively() {
        assert_eq!("PageUp".parse::<NamedKey>().expect("key"), NamedKey::PageUp);
        assert_eq!("esc".parse::<NamedKey>().expect("key"), NamedKey::Escape);
        assert!("F13".parse::<NamedKey>().is_err());
    }

    #[test]
    fn control_bytes_mask_to_c0() {
        assert_eq!(control_byte('c').expect("ctrl-c"), 0x03);
        assert_eq!(control_byte('D').expect("ctrl-d"), 0x04);
        assert_eq!(control_byte('[').expect("ctrl-["), 0x1b);
        assert_eq!(control_byte('?').expect("ctrl-?"), 0x7f);
        assert!(control_byte('1').is_err());
    }
}
