use log::debug;

use crate::color::{ColorSpec, NamedColor, parse_extended_color};
use crate::style::{Flags, Style};

/// Applies the parameters of one `CSI ... m` sequence to `style`.
///
/// An empty parameter list is a reset. Unknown codes are skipped and the
/// remaining ones still apply.
pub fn apply_sgr(style: &mut Style, params: &[u16]) {
    if params.is_empty() {
        style.reset();
        return;
    }

    let mut iter = params.iter().copied();

    while let Some(param) = iter.next() {
        match param {
            0 => style.reset(),
            1 => style.flags.insert(Flags::BOLD),
            2 => style.flags.insert(Flags::DIM),
            3 => style.flags.insert(Flags::ITALIC),
            4 => style.flags.insert(Flags::UNDERLINE),
            5 | 6 => style.flags.insert(Flags::BLINK),
            7 => style.flags.insert(Flags::INVERSE),
            8 => style.flags.insert(Flags::HIDDEN),
            9 => style.flags.insert(Flags::STRIKETHROUGH),
            22 => style.flags.remove(Flags::BOLD | Flags::DIM),
            23 => style.flags.remove(Flags::ITALIC),
            24 => style.flags.remove(Flags::UNDERLINE),
            25 => style.flags.remove(Flags::BLINK),
            27 => style.flags.remove(Flags::INVERSE),
            28 => style.flags.remove(Flags::HIDDEN),
            29 => style.flags.remove(Flags::STRIKETHROUGH),
            30..=37 => style.foreground = named(param - 30),
            38 => match parse_extended_color(&mut iter) {
                Some(spec) => style.foreground = Some(spec),
                None => debug!("malformed extended foreground in {params:?}"),
            },
            39 => style.foreground = None,
            40..=47 => style.background = named(param - 40),
            48 => match parse_extended_color(&mut iter) {
                Some(spec) => style.background = Some(spec),
                None => debug!("malformed extended background in {params:?}"),
            },
            49 => style.background = None,
            90..=97 => style.foreground = named(param - 90 + 8),
            100..=107 => style.background = named(param - 100 + 8),
            _ => debug!("unhandled sgr parameter {param}"),
        }
    }
}

fn named(index: u16) -> Option<ColorSpec> {
    u8::try_from(index)
        .ok()
        .and_then(NamedColor::from_index)
        .map(ColorSpec::Named)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;

    fn applied(params: &[u16]) -> Style {
        let mut style = Style::default();
        apply_sgr(&mut style, params);
        style
    }

    #[test]
    fn palette_codes_select_named_colors() {
        let style = applied(&[31, 44]);

        assert_eq!(style.foreground, Some(ColorSpec::Named(NamedColor::Red)));
        assert_eq!(style.background, Some(ColorSpec::Named(NamedColor::Blue)));
    }

    #[test]
    fn bright_codes_select_upper_half() {
        let style = applied(&[97, 100]);

        assert_eq!(
            style.foreground,
            Some(ColorSpec::Named(NamedColor::BrightWhite))
        );
        assert_eq!(
            style.background,
            Some(ColorSpec::Named(NamedColor::BrightBlack))
        );
    }

    #[test]
    fn extended_colors_skip_consumed_parameters() {
        let style = applied(&[38, 2, 10, 20, 30, 1]);

        assert_eq!(
            style.foreground,
            Some(ColorSpec::TrueColor(Rgb::new(10, 20, 30)))
        );
        assert_eq!(style.flags, Flags::BOLD);

        let style = applied(&[48, 5, 3, 4]);
        assert_eq!(style.background, Some(ColorSpec::Indexed(3)));
        assert_eq!(style.flags, Flags::UNDERLINE);
    }

    #[test]
    fn twenty_two_clears_bold_and_dim() {
        let style = applied(&[1, 2, 3, 22]);

        assert_eq!(style.flags, Flags::ITALIC);
    }

    #[test]
    fn cancel_codes_clear_their_flag() {
        let mut style = applied(&[3, 4, 5, 7, 8, 9]);
        apply_sgr(&mut style, &[23, 24, 25, 27, 28, 29]);

        assert!(style.flags.is_empty());
    }

    #[test]
    fn default_color_codes_clear_colors() {
        let mut style = applied(&[31, 41]);
        apply_sgr(&mut style, &[39, 49]);

        assert!(style.is_default());
    }

    #[test]
    fn empty_and_zero_reset() {
        let mut style = applied(&[1, 31]);
        apply_sgr(&mut style, &[]);
        assert!(style.is_default());

        let style = applied(&[1, 31, 0, 4]);
        assert_eq!(style.flags, Flags::UNDERLINE);
        assert_eq!(style.foreground, None);
    }

    #[test]
    fn unknown_codes_do_not_stop_processing() {
        let style = applied(&[73, 1]);

        assert_eq!(style.flags, Flags::BOLD);
    }
}
