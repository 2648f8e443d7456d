//! Callbacks invoked by the parser.
//!
//! The [`Parser`](crate::Parser) walks a character stream and hands every
//! recognized action to an [`Actor`]. Only printing, C0/C1 execution and
//! control sequence dispatch are mandatory; string-type sequences default to
//! being absorbed.

/// Consumer-facing interface for actions emitted by the parser.
///
/// `params` are decimal integer parameters separated by `;`. An omitted
/// parameter is reported as zero. An intermediate is a byte in the range
/// `0x20..=0x2f` that occurs before the final character; at most two are
/// kept and `ignored_excess_intermediates` is set when more were seen.
pub trait Actor {
    /// Emits a single printable character.
    fn print(&mut self, c: char);

    /// Executes a single C0 or C1 control that is not part of a sequence.
    fn execute(&mut self, byte: u8);

    /// Dispatches a complete control sequence (`CSI ... final`).
    ///
    /// `marker` holds the private marker (`<`, `=`, `>` or `?`) when the
    /// sequence opened with one.
    fn csi_dispatch(
        &mut self,
        params: &[u16],
        intermediates: &[u8],
        marker: Option<u8>,
        action: char,
    );

    /// Dispatches a plain escape sequence.
    fn esc_dispatch(
        &mut self,
        _intermediates: &[u8],
        _ignored_excess_intermediates: bool,
        _byte: u8,
    ) {
    }

    /// Signals the start of a device control string.
    fn hook(
        &mut self,
        _params: &[u16],
        _intermediates: &[u8],
        _marker: Option<u8>,
        _action: char,
    ) {
    }

    /// Passes one character of the device control payload.
    fn put(&mut self, _c: char) {}

    /// Marks the end of the current device control string.
    fn unhook(&mut self) {}

    /// Dispatches an operating system command split on `;`.
    fn osc_dispatch(&mut self, _params: &[&str]) {}
}
