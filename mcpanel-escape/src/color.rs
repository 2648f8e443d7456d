use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// One of the sixteen palette colors addressable by plain SGR codes.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NamedColor {
    Black = 0,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl NamedColor {
    const ALL: [NamedColor; 16] = [
        Self::Black,
        Self::Red,
        Self::Green,
        Self::Yellow,
        Self::Blue,
        Self::Magenta,
        Self::Cyan,
        Self::White,
        Self::BrightBlack,
        Self::BrightRed,
        Self::BrightGreen,
        Self::BrightYellow,
        Self::BrightBlue,
        Self::BrightMagenta,
        Self::BrightCyan,
        Self::BrightWhite,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn is_bright(self) -> bool {
        self.index() >= 8
    }
}

#[derive(
    Debug, Eq, PartialEq, Copy, Clone, Default, Hash, Serialize, Deserialize,
)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Color exactly as the stream specified it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ColorSpec {
    Named(NamedColor),
    Indexed(u8),
    TrueColor(Rgb),
}

/// Resolves a 256-color palette index that lies outside the sixteen named
/// colors: `16..=231` address the 6x6x6 cube, `232..=255` the gray ramp.
pub fn extended_rgb(index: u8) -> Option<Rgb> {
    match index {
        0..=15 => None,
        16..=231 => {
            let cube = index - 16;
            let axis = |value: u8| if value == 0 { 0 } else { value * 40 + 55 };

            Some(Rgb::new(
                axis(cube / 36),
                axis((cube / 6) % 6),
                axis(cube % 6),
            ))
        },
        _ => {
            let level = (index - 232) * 10 + 8;
            Some(Rgb::new(level, level, level))
        },
    }
}

/// Concrete colors used to resolve [`ColorSpec`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub named: [Rgb; 16],
    pub foreground: Rgb,
    pub background: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            named: [
                Rgb::new(0x00, 0x00, 0x00),
                Rgb::new(0xcd, 0x00, 0x00),
                Rgb::new(0x00, 0xcd, 0x00),
                Rgb::new(0xcd, 0xcd, 0x00),
                Rgb::new(0x00, 0x00, 0xee),
                Rgb::new(0xcd, 0x00, 0xcd),
                Rgb::new(0x00, 0xcd, 0xcd),
                Rgb::new(0xe5, 0xe5, 0xe5),
                Rgb::new(0x7f, 0x7f, 0x7f),
                Rgb::new(0xff, 0x00, 0x00),
                Rgb::new(0x00, 0xff, 0x00),
                Rgb::new(0xff, 0xff, 0x00),
                Rgb::new(0x5c, 0x5c, 0xff),
                Rgb::new(0xff, 0x00, 0xff),
                Rgb::new(0x00, 0xff, 0xff),
                Rgb::new(0xff, 0xff, 0xff),
            ],
            foreground: Rgb::new(0xe5, 0xe5, 0xe5),
            background: Rgb::new(0x00, 0x00, 0x00),
        }
    }
}

impl Palette {
    pub fn resolve(&self, spec: ColorSpec) -> Rgb {
        match spec {
            ColorSpec::Named(color) => self.named[usize::from(color.index())],
            ColorSpec::Indexed(index) => extended_rgb(index)
                .unwrap_or_else(|| self.named[usize::from(index & 0x0f)]),
            ColorSpec::TrueColor(rgb) => rgb,
        }
    }
}

/// Reads the color selector following an extended color introducer
/// (`38`, `48`): either `5;index` or `2;r;g;b`.
pub(crate) fn parse_extended_color<I>(iter: &mut I) -> Option<ColorSpec>
where
    I: Iterator<Item = u16>,
{
    match iter.next() {
        Some(5) => {
            let index = iter.next()?;
            u8::try_from(index).ok().map(ColorSpec::Indexed)
        },
        Some(2) => {
            let r = iter.next()?;
            let g = iter.next()?;
            let b = iter.next()?;

            if r > u8::MAX as u16 || g > u8::MAX as u16 || b > u8::MAX as u16 {
                return None;
            }

            Some(ColorSpec::TrueColor(Rgb::new(r as u8, g as u8, b as u8)))
        },
        _ => None,
    }
}
