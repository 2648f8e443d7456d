mod color;
mod decoder;
mod sgr;
mod style;

pub use mcpanel_vte as vte;

pub use color::{ColorSpec, NamedColor, Palette, Rgb, extended_rgb};
pub use decoder::{Decoder, StyledRun};
pub use sgr::apply_sgr;
pub use style::{DIM_ALPHA, EffectiveColors, Flags, Style};
