use std::fmt::Write as _;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::color::{ColorSpec, Palette, Rgb};

bitflags! {
    /// Text decorations toggled by SGR codes.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Flags: u8 {
        const BOLD          = 1 << 0;
        const DIM           = 1 << 1;
        const ITALIC        = 1 << 2;
        const UNDERLINE     = 1 << 3;
        const BLINK         = 1 << 4;
        const INVERSE       = 1 << 5;
        const HIDDEN        = 1 << 6;
        const STRIKETHROUGH = 1 << 7;
    }
}

/// SGR code that turns each flag on, in export order.
const FLAG_CODES: [(Flags, u8); 8] = [
    (Flags::BOLD, 1),
    (Flags::DIM, 2),
    (Flags::ITALIC, 3),
    (Flags::UNDERLINE, 4),
    (Flags::BLINK, 5),
    (Flags::INVERSE, 7),
    (Flags::HIDDEN, 8),
    (Flags::STRIKETHROUGH, 9),
];

/// Opacity applied to the foreground of dim text.
pub const DIM_ALPHA: f32 = 0.5;

/// Current text attributes.
///
/// `None` colors mean the terminal default. Every flag combination is valid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct Style {
    pub foreground: Option<ColorSpec>,
    pub background: Option<ColorSpec>,
    pub flags: Flags,
}

/// Colors a renderer should paint with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveColors {
    pub foreground: Rgb,
    /// `None` keeps the surface background.
    pub background: Option<Rgb>,
    pub foreground_alpha: f32,
}

impl Style {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_default(&self) -> bool {
        self.foreground.is_none()
            && self.background.is_none()
            && self.flags.is_empty()
    }

    pub fn effective_colors(&self, palette: &Palette) -> EffectiveColors {
        let mut foreground = self
            .foreground
            .map_or(palette.foreground, |spec| palette.resolve(spec));
        let mut background = self.background.map(|spec| palette.resolve(spec));

        if self.flags.contains(Flags::INVERSE) {
            let swapped = background.unwrap_or(palette.background);
            background = Some(foreground);
            foreground = swapped;
        }

        let foreground_alpha = if self.flags.contains(Flags::HIDDEN) {
            0.0
        } else if self.flags.contains(Flags::DIM) {
            DIM_ALPHA
        } else {
            1.0
        };

        EffectiveColors {
            foreground,
            background,
            foreground_alpha,
        }
    }

    /// Serializes the style as the shortest SGR sequence that reproduces it
    /// from any prior state: a reset followed by every active attribute.
    pub fn to_sgr(&self) -> String {
        let mut codes = String::from("0");

        for (flag, code) in FLAG_CODES {
            if self.flags.contains(flag) {
                let _ = write!(codes, ";{code}");
            }
        }

        if let Some(spec) = self.foreground {
            push_color(&mut codes, spec, 30, 90, 38);
        }

        if let Some(spec) = self.background {
            push_color(&mut codes, spec, 40, 100, 48);
        }

        format!("\x1b[{codes}m")
    }
}

fn push_color(
    codes: &mut String,
    spec: ColorSpec,
    base: u8,
    bright_base: u8,
    extended: u8,
) {
    let _ = match spec {
        ColorSpec::Named(color) if color.is_bright() => {
            write!(codes, ";{}", bright_base + color.index() - 8)
        },
        ColorSpec::Named(color) => write!(codes, ";{}", base + color.index()),
        ColorSpec::Indexed(index) => write!(codes, ";{extended};5;{index}"),
        ColorSpec::TrueColor(Rgb { r, g, b }) => {
            write!(codes, ";{extended};2;{r};{g};{b}")
        },
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::NamedColor;

    #[test]
    fn default_style_exports_bare_reset() {
        let style = Style::default();

        assert!(style.is_default());
        assert_eq!(style.to_sgr(), "\x1b[0m");
    }

    #[test]
    fn export_lists_flags_then_colors() {
        let style = Style {
            foreground: Some(ColorSpec::Named(NamedColor::BrightRed)),
            background: Some(ColorSpec::TrueColor(Rgb::new(1, 2, 3))),
            flags: Flags::BOLD | Flags::UNDERLINE,
        };

        assert_eq!(style.to_sgr(), "\x1b[0;1;4;91;48;2;1;2;3m");
    }

    #[test]
    fn export_keeps_palette_index() {
        let style = Style {
            foreground: Some(ColorSpec::Indexed(208)),
            ..Style::default()
        };

        assert_eq!(style.to_sgr(), "\x1b[0;38;5;208m");
    }

    #[test]
    fn reset_restores_defaults() {
        let mut style = Style {
            foreground: Some(ColorSpec::Named(NamedColor::Green)),
            background: None,
            flags: Flags::all(),
        };

        style.reset();

        assert_eq!(style, Style::default());
    }

    #[test]
    fn inverse_swaps_effective_colors() {
        let palette = Palette::default();
        let style = Style {
            foreground: Some(ColorSpec::TrueColor(Rgb::new(10, 20, 30))),
            background: None,
            flags: Flags::INVERSE,
        };

        let colors = style.effective_colors(&palette);

        assert_eq!(colors.foreground, palette.background);
        assert_eq!(colors.background, Some(Rgb::new(10, 20, 30)));
    }

    #[test]
    fn dim_lowers_foreground_opacity_only() {
        let palette = Palette::default();
        let style = Style {
            flags: Flags::DIM,
            ..Style::default()
        };

        let colors = style.effective_colors(&palette);

        assert_eq!(colors.foreground, palette.foreground);
        assert_eq!(colors.foreground_alpha, DIM_ALPHA);
        assert_eq!(colors.background, None);
    }
}
