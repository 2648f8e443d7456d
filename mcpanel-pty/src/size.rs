use nix::libc::{self, winsize};

/// The size of the visible display area in the pty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtySize {
    /// The number of lines of text
    pub rows: u16,
    /// The number of columns of text
    pub cols: u16,
    /// The width of a cell in pixels.
    pub cell_width: u16,
    /// The height of a cell in pixels.
    pub cell_height: u16,
}

impl PtySize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }
}

impl Default for PtySize {
    fn default() -> Self {
        PtySize {
            rows: 24,
            cols: 80,
            cell_width: 0,
            cell_height: 0,
        }
    }
}

impl From<PtySize> for winsize {
    fn from(value: PtySize) -> winsize {
        let ws_row = value.rows as libc::c_ushort;
        let ws_col = value.cols as libc::c_ushort;

        let ws_xpixel = ws_col.saturating_mul(value.cell_width);
        let ws_ypixel = ws_row.saturating_mul(value.cell_height);

        winsize {
            ws_row,
            ws_col,
            ws_xpixel,
            ws_ypixel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winsize_scales_pixels_by_cells() {
        let size = PtySize {
            rows: 10,
            cols: 20,
            cell_width: 8,
            cell_height: 16,
        };

        let ws: winsize = size.into();

        assert_eq!((ws.ws_row, ws.ws_col), (10, 20));
        assert_eq!((ws.ws_xpixel, ws.ws_ypixel), (160, 160));
    }

    #[test]
    fn huge_pixel_sizes_saturate() {
        let ws: winsize = PtySize {
            rows: 1000,
            cols: 1000,
            cell_width: 1000,
            cell_height: 1000,
        }
        .into();

        assert_eq!(ws.ws_xpixel, u16::MAX);
    }
}
