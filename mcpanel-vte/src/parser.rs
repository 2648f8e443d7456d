use crate::actor::Actor;
use crate::enums::{Action, State};
use crate::transitions::{self, class_of};

const MAX_INTERMEDIATES: usize = 2;
const MAX_OSC_PARAMS: usize = 16;
const MAX_OSC_LEN: usize = 1 << 16;
const MAX_PARAMS: usize = 32;

#[derive(Debug)]
struct Params {
    items: [u16; MAX_PARAMS],
    current: Option<u16>,
    idx: usize,
    full: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            items: [0; MAX_PARAMS],
            current: None,
            idx: 0,
            full: false,
        }
    }
}

impl Params {
    fn get(&self) -> &[u16] {
        &self.items[..self.idx]
    }

    fn push(&mut self, param: u16) {
        if self.idx >= MAX_PARAMS {
            self.full = true;
            return;
        }

        self.items[self.idx] = param;
        self.idx += 1;
    }

    fn advance(&mut self, byte: u8) {
        if self.full {
            return;
        }

        match byte {
            b'0'..=b'9' => {
                let digit = u16::from(byte - b'0');
                let value = self.current.unwrap_or(0);
                self.current =
                    Some(value.saturating_mul(10).saturating_add(digit));
            },
            _ => {
                let value = self.current.take().unwrap_or(0);
                self.push(value);
            },
        }
    }

    /// Closes the parameter under construction. A trailing separator yields
    /// one more zero parameter; a sequence without any parameter bytes stays
    /// empty.
    fn finish(&mut self) {
        if self.current.is_some() || self.idx > 0 {
            let value = self.current.take().unwrap_or(0);
            self.push(value);
        }
    }

    fn clear(&mut self) {
        self.current = None;
        self.idx = 0;
        self.full = false;
    }
}

#[derive(Debug, Default)]
struct Intermediates {
    items: [u8; MAX_INTERMEDIATES],
    idx: usize,
    ignored_excess: bool,
}

impl Intermediates {
    fn get(&self) -> &[u8] {
        &self.items[..self.idx]
    }

    fn collect(&mut self, byte: u8) {
        if self.idx < MAX_INTERMEDIATES {
            self.items[self.idx] = byte;
            self.idx += 1;
        } else {
            self.ignored_excess = true;
        }
    }

    fn clear(&mut self) {
        self.idx = 0;
        self.ignored_excess = false;
    }
}

#[derive(Debug, Default)]
struct OscState {
    buffer: String,
    full: bool,
}

impl OscState {
    fn put(&mut self, c: char) {
        if self.full {
            return;
        }

        if self.buffer.len() + c.len_utf8() > MAX_OSC_LEN {
            self.full = true;
            return;
        }

        self.buffer.push(c);
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.full = false;
    }
}

/// DEC/ANSI parser over already decoded characters.
///
/// The parser keeps its state between calls, so a sequence split across two
/// [`advance`](Parser::advance) calls is recognized as a whole.
#[derive(Debug, Default)]
pub struct Parser {
    state: State,
    intermediates: Intermediates,
    params: Params,
    marker: Option<u8>,
    osc: OscState,
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of the machine.
    pub fn state(&self) -> State {
        self.state
    }

    /// Drops any partially parsed sequence and returns to ground.
    pub fn reset(&mut self) {
        self.clear();
        self.state = State::Ground;
    }

    pub fn advance<A: Actor>(&mut self, text: &str, actor: &mut A) {
        for c in text.chars() {
            self.advance_char(c, actor);
        }
    }

    pub fn advance_char<A: Actor>(&mut self, c: char, actor: &mut A) {
        let (next_state, action) =
            transitions::transit(self.state, class_of(c));

        if next_state == self.state {
            self.perform(action, c, actor);
            return;
        }

        self.perform(transitions::exit_action(self.state), c, actor);
        self.perform(action, c, actor);
        self.perform(transitions::entry_action(next_state), c, actor);
        self.state = next_state;
    }

    fn perform<A: Actor>(&mut self, action: Action, c: char, actor: &mut A) {
        use Action::*;

        match action {
            Print => actor.print(c),
            Execute => actor.execute(class_of(c)),
            Put => actor.put(c),
            Collect => self.intermediates.collect(class_of(c)),
            Marker => self.marker = Some(class_of(c)),
            Param => self.params.advance(class_of(c)),
            Clear => self.clear(),
            CsiDispatch => {
                self.params.finish();
                actor.csi_dispatch(
                    self.params.get(),
                    self.intermediates.get(),
                    self.marker,
                    c,
                );
            },
            EscDispatch => actor.esc_dispatch(
                self.intermediates.get(),
                self.intermediates.ignored_excess,
                class_of(c),
            ),
            Hook => {
                self.params.finish();
                actor.hook(
                    self.params.get(),
                    self.intermediates.get(),
                    self.marker,
                    c,
                );
            },
            Unhook => actor.unhook(),
            OscStart => self.osc.clear(),
            OscPut => self.osc.put(c),
            OscEnd => self.osc_dispatch(actor),
            None | Ignore => {},
        }
    }

    fn osc_dispatch<A: Actor>(&mut self, actor: &mut A) {
        if self.osc.buffer.is_empty() {
            actor.osc_dispatch(&[]);
            return;
        }

        let params: Vec<&str> =
            self.osc.buffer.splitn(MAX_OSC_PARAMS, ';').collect();
        actor.osc_dispatch(&params);
    }

    fn clear(&mut self) {
        self.intermediates.clear();
        self.params.clear();
        self.marker = None;
        self.osc.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum ActorEvents {
        Print(char),
        Execute(u8),
        CsiDispatch {
            params: Vec<u16>,
            intermediates: Vec<u8>,
            marker: Option<u8>,
            action: char,
        },
        EscDispatch {
            intermediates: Vec<u8>,
            byte: u8,
        },
        Hook {
            params: Vec<u16>,
            action: char,
        },
        Put(char),
        Unhook,
        OscDispatch(Vec<String>),
    }

    #[derive(Default)]
    struct CollectingActor {
        actions: Vec<ActorEvents>,
    }

    impl Actor for CollectingActor {
        fn print(&mut self, c: char) {
            self.actions.push(ActorEvents::Print(c));
        }

        fn execute(&mut self, byte: u8) {
            self.actions.push(ActorEvents::Execute(byte));
        }

        fn csi_dispatch(
            &mut self,
            params: &[u16],
            intermediates: &[u8],
            marker: Option<u8>,
            action: char,
        ) {
            self.actions.push(ActorEvents::CsiDispatch {
                params: params.to_vec(),
                intermediates: intermediates.to_vec(),
                marker,
                action,
            });
        }

        fn esc_dispatch(
            &mut self,
            intermediates: &[u8],
            _ignored_excess_intermediates: bool,
            byte: u8,
        ) {
            self.actions.push(ActorEvents::EscDispatch {
                intermediates: intermediates.to_vec(),
                byte,
            });
        }

        fn hook(
            &mut self,
            params: &[u16],
            _intermediates: &[u8],
            _marker: Option<u8>,
            action: char,
        ) {
            self.actions.push(ActorEvents::Hook {
                params: params.to_vec(),
                action,
            });
        }

        fn put(&mut self, c: char) {
            self.actions.push(ActorEvents::Put(c));
        }

        fn unhook(&mut self) {
            self.actions.push(ActorEvents::Unhook);
        }

        fn osc_dispatch(&mut self, params: &[&str]) {
            self.actions.push(ActorEvents::OscDispatch(
                params.iter().map(|p| p.to_string()).collect(),
            ));
        }
    }

    fn parse(text: &str) -> Vec<ActorEvents> {
        let mut parser = Parser::new();
        let mut actor = CollectingActor::default();
        parser.advance(text, &mut actor);
        actor.actions
    }

    fn csi(params: &[u16], marker: Option<u8>, action: char) -> ActorEvents {
        ActorEvents::CsiDispatch {
            params: params.to_vec(),
            intermediates: vec![],
            marker,
            action,
        }
    }

    #[test]
    fn parses_printable_and_sgr() {
        assert_eq!(
            parse("te\x07\x1b[32mmy"),
            vec![
                ActorEvents::Print('t'),
                ActorEvents::Print('e'),
                ActorEvents::Execute(0x07),
                csi(&[32], None, 'm'),
                ActorEvents::Print('m'),
                ActorEvents::Print('y'),
            ]
        );
    }

    #[test]
    fn omitted_parameters_default_to_zero() {
        assert_eq!(parse("\x1b[m"), vec![csi(&[], None, 'm')]);
        assert_eq!(parse("\x1b[;1m"), vec![csi(&[0, 1], None, 'm')]);
        assert_eq!(parse("\x1b[1;m"), vec![csi(&[1, 0], None, 'm')]);
        assert_eq!(
            parse("\x1b[38;5;208m"),
            vec![csi(&[38, 5, 208], None, 'm')]
        );
    }

    #[test]
    fn private_marker_is_reported() {
        assert_eq!(
            parse("\x1b[?25l"),
            vec![csi(&[25], Some(b'?'), 'l')]
        );
    }

    #[test]
    fn colon_and_late_marker_are_ignored() {
        assert_eq!(parse("\x1b[4:3mx"), vec![ActorEvents::Print('x')]);
        assert_eq!(parse("\x1b[1?mx"), vec![ActorEvents::Print('x')]);
    }

    #[test]
    fn cancel_aborts_sequence() {
        assert_eq!(
            parse("\x1b[31\x18x"),
            vec![ActorEvents::Execute(0x18), ActorEvents::Print('x')]
        );
    }

    #[test]
    fn osc_terminates_on_bel_st_and_escape() {
        let expected = ActorEvents::OscDispatch(vec!["0".into(), "t".into()]);

        assert_eq!(parse("\x1b]0;t\x07"), vec![expected]);

        let events = parse("\x1b]0;t\x1b\\a");
        assert_eq!(
            events[0],
            ActorEvents::OscDispatch(vec!["0".into(), "t".into()])
        );
        assert_eq!(events.last(), Some(&ActorEvents::Print('a')));

        assert_eq!(
            parse("\u{9d}2;x\u{9c}b"),
            vec![
                ActorEvents::OscDispatch(vec!["2".into(), "x".into()]),
                ActorEvents::Print('b')
            ]
        );
    }

    #[test]
    fn eight_bit_csi_dispatches() {
        assert_eq!(parse("\u{9b}1m"), vec![csi(&[1], None, 'm')]);
    }

    #[test]
    fn dcs_payload_is_forwarded_between_hook_and_unhook() {
        assert_eq!(
            parse("\x1bP1qab\x1b\\"),
            vec![
                ActorEvents::Hook {
                    params: vec![1],
                    action: 'q'
                },
                ActorEvents::Put('a'),
                ActorEvents::Put('b'),
                ActorEvents::Unhook,
                ActorEvents::EscDispatch {
                    intermediates: vec![],
                    byte: b'\\'
                },
            ]
        );
    }

    #[test]
    fn apc_string_is_absorbed() {
        assert_eq!(parse("\x1b_hidden\x1b\\v").last(), Some(&ActorEvents::Print('v')));
        assert!(!parse("\x1b_hidden\x1b\\v")
            .iter()
            .any(|e| *e == ActorEvents::Print('h')));
    }

    #[test]
    fn sequence_split_across_calls_is_recognized() {
        let mut parser = Parser::new();
        let mut actor = CollectingActor::default();
        parser.advance("\x1b[3", &mut actor);
        assert_eq!(parser.state(), State::CsiParam);
        parser.advance("1mz", &mut actor);

        assert_eq!(
            actor.actions,
            vec![csi(&[31], None, 'm'), ActorEvents::Print('z')]
        );
    }

    #[test]
    fn wide_characters_print() {
        assert_eq!(
            parse("é€"),
            vec![ActorEvents::Print('é'), ActorEvents::Print('€')]
        );
    }

    #[test]
    fn parameters_saturate_instead_of_overflowing() {
        assert_eq!(parse("\x1b[99999999m"), vec![csi(&[u16::MAX], None, 'm')]);
    }
}
