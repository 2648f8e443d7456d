//! Output pump: one thread per live connection that drains the pty, splits
//! frames from display text, decodes styles and fans the results out.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender, TryRecvError};
use log::{debug, warn};
use mcpanel_escape::Decoder;
use mcpanel_escape::vte::Utf8Decoder;
use mcpanel_frame::{Extracted, Frame, FrameExtractor};
use mcpanel_pty::{PtySize, SessionError};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::{ConsoleError, Result};
use crate::event::OutputChunk;
use crate::hub::Hub;
use crate::launcher::BoxedSession;

const PTY_IO_TOKEN: Token = Token(0);
const PTY_CHILD_TOKEN: Token = Token(1);
const PUMP_WAKE_TOKEN: Token = Token(2);
const DEFAULT_EVENT_CAPACITY: usize = 128;
const TAIL_LIMIT: usize = 512;
const RESIZE_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Time of the most recent bytes read from any connection of a console.
#[derive(Debug, Default)]
pub(crate) struct ActivityClock {
    last: Mutex<Option<Instant>>,
}

impl ActivityClock {
    pub(crate) fn touch(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(Instant::now());
        }
    }

    pub(crate) fn last(&self) -> Option<Instant> {
        self.last.lock().ok().and_then(|last| *last)
    }
}

/// How a pump ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PumpExit {
    pub exit_code: Option<i32>,
    /// Last visible text, for error messages.
    pub tail: String,
    pub error: Option<String>,
}

pub(crate) enum PumpRequest {
    Write(Vec<u8>),
    Resize(PtySize, Sender<std::result::Result<(), SessionError>>),
    Shutdown,
}

/// Cloneable sender of requests into a running pump.
#[derive(Clone)]
pub(crate) struct PumpProxy {
    sender: Sender<PumpRequest>,
    waker: Arc<Waker>,
}

impl PumpProxy {
    /// Submit a request and wake the pump loop.
    fn send(&self, request: PumpRequest) -> Result<()> {
        self.sender
            .send(request)
            .map_err(|_| ConsoleError::NotConnected)?;
        self.waker.wake()?;
        Ok(())
    }

    pub(crate) fn write(&self, bytes: Vec<u8>) -> Result<()> {
        self.send(PumpRequest::Write(bytes))
    }

    pub(crate) fn resize(&self, size: PtySize) -> Result<()> {
        let (tx, rx) = flume::bounded(1);
        self.send(PumpRequest::Resize(size, tx))?;
        match rx.recv_timeout(RESIZE_REPLY_TIMEOUT) {
            Ok(result) => result.map_err(ConsoleError::from),
            Err(flume::RecvTimeoutError::Timeout) => Err(ConsoleError::Timeout),
            Err(flume::RecvTimeoutError::Disconnected) => {
                Err(ConsoleError::NotConnected)
            },
        }
    }
}

/// Everything a pump publishes to, shared with the owning console.
pub(crate) struct PumpSinks {
    pub activity: Arc<ActivityClock>,
    pub messages: Arc<Hub<Frame>>,
    pub output: Arc<Hub<OutputChunk>>,
}

/// Owner side of a running pump.
pub(crate) struct PumpHandle {
    proxy: PumpProxy,
    thread: Option<JoinHandle<()>>,
    exit: Receiver<PumpExit>,
    output: Arc<Hub<OutputChunk>>,
}

impl PumpHandle {
    pub(crate) fn proxy(&self) -> PumpProxy {
        self.proxy.clone()
    }

    pub(crate) fn output(&self) -> &Arc<Hub<OutputChunk>> {
        &self.output
    }

    /// Resolves once the pump has ended, with how it ended.
    pub(crate) fn exit(&self) -> Receiver<PumpExit> {
        self.exit.clone()
    }

    /// Stop reading, terminate the process and wait for the thread.
    pub(crate) fn shutdown(mut self) {
        let _ = self.proxy.send(PumpRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                warn!("console pump thread panicked");
            }
        }
    }
}

/// Start pumping `session` on a dedicated thread. `on_exit` runs on that
/// thread once the session is closed.
pub(crate) fn spawn<F>(
    name: &str,
    session: BoxedSession,
    read_buffer_capacity: usize,
    sinks: PumpSinks,
    on_exit: F,
) -> Result<PumpHandle>
where
    F: FnOnce(PumpExit) + Send + 'static,
{
    let mut poll = Poll::new()?;
    let waker = Arc::new(Waker::new(poll.registry(), PUMP_WAKE_TOKEN)?);
    let (request_tx, request_rx) = flume::unbounded();
    let (exit_tx, exit_rx) = flume::bounded(1);
    let output = Arc::clone(&sinks.output);

    let mut pump = Pump {
        session,
        requests: request_rx,
        pending_input: VecDeque::new(),
        utf8: Utf8Decoder::new(),
        extractor: FrameExtractor::new(),
        decoder: Decoder::new(),
        read_buffer: vec![0u8; read_buffer_capacity.max(1)],
        tail: String::new(),
        sinks,
    };

    let thread = thread::Builder::new()
        .name(format!("mcpanel-pump-{name}"))
        .spawn(move || {
            let outcome = pump.run(&mut poll);
            let exit = pump.finish(&poll, outcome);
            let _ = exit_tx.send(exit.clone());
            on_exit(exit);
        })?;

    Ok(PumpHandle {
        proxy: PumpProxy {
            sender: request_tx,
            waker,
        },
        thread: Some(thread),
        exit: exit_rx,
        output,
    })
}

struct Pump {
    session: BoxedSession,
    requests: Receiver<PumpRequest>,
    pending_input: VecDeque<u8>,
    utf8: Utf8Decoder,
    extractor: FrameExtractor,
    decoder: Decoder,
    read_buffer: Vec<u8>,
    tail: String,
    sinks: PumpSinks,
}

impl Pump {
    /// Drive the session until end of stream, child exit or shutdown.
    /// Returns the exit code when the child was seen exiting.
    fn run(&mut self, poll: &mut Poll) -> std::result::Result<Option<i32>, SessionError> {
        let mut events = Events::with_capacity(DEFAULT_EVENT_CAPACITY);
        let mut interest = Interest::READABLE;
        self.session.register(
            poll.registry(),
            interest,
            PTY_IO_TOKEN,
            PTY_CHILD_TOKEN,
        )?;

        let mut shutdown_requested = false;
        let mut eof = false;
        let mut exit_code = None;

        loop {
            poll_once(poll, &mut events)?;

            for event in events.iter() {
                match event.token() {
                    PTY_IO_TOKEN => {
                        if event.is_readable() || event.is_read_closed() {
                            eof |= self.on_readable()?;
                        }
                        if event.is_writable() {
                            self.on_writable()?;
                        }
                    },
                    PTY_CHILD_TOKEN => {
                        if let Some(code) = self.session.try_get_child_exit_status()? {
                            exit_code = Some(code);
                        }
                    },
                    _ => {},
                }
            }

            shutdown_requested |= self.drain_requests()?;

            if exit_code.is_none() {
                exit_code = self.session.try_get_child_exit_status()?;
            }

            if exit_code.is_some() && !eof {
                // Output written right before exiting is still buffered.
                eof = self.on_readable()?;
            }

            if eof || shutdown_requested || exit_code.is_some() {
                break;
            }

            let mut desired_interest = Interest::READABLE;
            if !self.pending_input.is_empty() {
                desired_interest |= Interest::WRITABLE;
            }

            if desired_interest != interest {
                self.session.reregister(
                    poll.registry(),
                    desired_interest,
                    PTY_IO_TOKEN,
                    PTY_CHILD_TOKEN,
                )?;
                interest = desired_interest;
            }
        }

        Ok(exit_code)
    }

    /// Release the session and flush what the extractor still holds.
    fn finish(
        &mut self,
        poll: &Poll,
        outcome: std::result::Result<Option<i32>, SessionError>,
    ) -> PumpExit {
        if let Err(err) = self.session.deregister(poll.registry()) {
            debug!("failed to deregister console session: {err}");
        }

        let (mut exit_code, error) = match outcome {
            Ok(code) => (code, None),
            Err(err) => {
                warn!("console pump stopped: {err}");
                (None, Some(err.to_string()))
            },
        };

        match self.session.close() {
            Ok(code) => {
                exit_code.get_or_insert(code);
            },
            Err(err) => debug!("failed to close console session: {err}"),
        }

        let rest = self.extractor.finish();
        self.emit(rest);
        self.sinks.output.close();

        PumpExit {
            exit_code,
            tail: std::mem::take(&mut self.tail),
            error,
        }
    }

    /// Read until the session would block. Returns `true` at end of stream.
    fn on_readable(&mut self) -> std::result::Result<bool, SessionError> {
        loop {
            match self.session.read(&mut self.read_buffer) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    let text = self.utf8.decode(&self.read_buffer[..n]);
                    self.process(&text);
                },
                Err(err) if err.is_would_block() => return Ok(false),
                Err(SessionError::IO(err)) if err.kind() == ErrorKind::Interrupted => {
                    continue;
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn on_writable(&mut self) -> std::result::Result<(), SessionError> {
        while !self.pending_input.is_empty() {
            let (front, _) = self.pending_input.as_slices();
            match self.session.write(front) {
                Ok(0) => break,
                Ok(n) => {
                    self.pending_input.drain(..n);
                },
                Err(err) if err.is_would_block() => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn drain_requests(&mut self) -> std::result::Result<bool, SessionError> {
        loop {
            match self.requests.try_recv() {
                Ok(PumpRequest::Write(bytes)) => {
                    self.pending_input.extend(bytes);
                    self.on_writable()?;
                },
                Ok(PumpRequest::Resize(size, reply)) => {
                    let _ = reply.send(self.session.resize(size));
                },
                Ok(PumpRequest::Shutdown) => return Ok(true),
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Disconnected) => return Ok(true),
            }
        }
    }

    fn process(&mut self, text: &str) {
        self.sinks.activity.touch();

        let Extracted { text, frames } = self.extractor.feed(text);
        for frame in frames {
            debug!("console frame: {frame:?}");
            self.sinks.messages.publish(&frame);
        }

        self.emit(text);
    }

    fn emit(&mut self, text: String) {
        if text.is_empty() {
            return;
        }

        let chunk = OutputChunk {
            runs: self.decoder.process(&text),
            text,
        };
        self.remember(&chunk.plain_text());
        self.sinks.output.publish(&chunk);
    }

    fn remember(&mut self, plain: &str) {
        self.tail.push_str(plain);
        if self.tail.len() > TAIL_LIMIT {
            let mut cut = self.tail.len() - TAIL_LIMIT;
            while !self.tail.is_char_boundary(cut) {
                cut += 1;
            }
            self.tail.drain(..cut);
        }
    }
}

fn poll_once(poll: &mut Poll, events: &mut Events) -> std::result::Result<(), SessionError> {
    events.clear();
    loop {
        match poll.poll(events, None) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(SessionError::IO(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mcpanel_frame::{Event, EventKind, encode_frame};
    use mcpanel_pty::pipe;

    use super::*;
    use crate::hub::Subscription;

    struct Running {
        handle: PumpHandle,
        peer: mcpanel_pty::PipePeer,
        output: Subscription<OutputChunk>,
        messages: Subscription<Frame>,
        activity: Arc<ActivityClock>,
    }

    fn start() -> Running {
        let (session, peer) = pipe(PtySize::default()).expect("pipe should open");
        let sinks = PumpSinks {
            activity: Arc::new(ActivityClock::default()),
            messages: Arc::new(Hub::new()),
            output: Arc::new(Hub::new()),
        };
        let output = sinks.output.subscribe();
        let messages = sinks.messages.subscribe();
        let activity = Arc::clone(&sinks.activity);

        let handle = spawn("test", Box::new(session), 64, sinks, |_| {})
            .expect("pump should start");

        Running {
            handle,
            peer,
            output,
            messages,
            activity,
        }
    }

    fn collect_text(output: &Subscription<OutputChunk>) -> String {
        output
            .iter()
            .map(|chunk| chunk.plain_text())
            .collect::<String>()
    }

    #[test]
    fn output_is_decoded_and_frames_are_split_off() {
        let mut running = start();
        let frame = encode_frame(&Frame::Event(Event::new(
            EventKind::ServerReady,
            None,
        )))
        .expect("frame should encode");
        let (head, rest) = frame.split_at(7);

        running
            .peer
            .write_output(b"\x1b[32mDone\x1b[0m (4.2s)!\r\n")
            .expect("write");
        running.peer.write_output(head.as_bytes()).expect("write");
        std::thread::sleep(Duration::from_millis(20));
        running.peer.write_output(rest.as_bytes()).expect("write");
        drop(running.peer);

        let exit = running
            .handle
            .exit()
            .recv_timeout(Duration::from_secs(5))
            .expect("pump should end at eof");

        assert_eq!(exit.exit_code, Some(0));
        assert_eq!(collect_text(&running.output), "Done (4.2s)!\n\n");

        let frame = running.messages.try_recv().expect("one frame");
        assert_eq!(
            frame.as_event().map(|event| &event.event),
            Some(&EventKind::ServerReady)
        );
        assert!(running.activity.last().is_some());
    }

    #[test]
    fn writes_and_resizes_reach_the_session() {
        let mut running = start();
        let proxy = running.handle.proxy();

        proxy.write(b"say hi\r".to_vec()).expect("write should queue");
        let input = running
            .peer
            .read_until(b"\r", Duration::from_secs(5))
            .expect("peer read");
        assert_eq!(input, b"say hi\r");

        proxy.resize(PtySize::new(40, 120)).expect("resize");
        assert_eq!(
            running.peer.resizes().last(),
            Some(&PtySize::new(40, 120))
        );

        running.handle.shutdown();
    }

    #[test]
    fn shutdown_hangs_up_the_session_and_ends_output() {
        let mut running = start();
        let exit = running.handle.exit();

        running.handle.shutdown();

        assert!(exit.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(running.peer.is_hung_up(Duration::from_secs(1)).expect("peer"));
        assert!(running.output.iter().next().is_none());
    }

    #[test]
    fn tail_keeps_the_last_characters() {
        let (session, _peer) = pipe(PtySize::default()).expect("pipe should open");
        let mut pump = Pump {
            session: Box::new(session),
            requests: flume::unbounded().1,
            pending_input: VecDeque::new(),
            utf8: Utf8Decoder::new(),
            extractor: FrameExtractor::new(),
            decoder: Decoder::new(),
            read_buffer: vec![0; 8],
            tail: String::new(),
            sinks: PumpSinks {
                activity: Arc::new(ActivityClock::default()),
                messages: Arc::new(Hub::new()),
                output: Arc::new(Hub::new()),
            },
        };

        pump.remember(&"é".repeat(400));

        assert!(pump.tail.len() <= TAIL_LIMIT + 1);
        assert!(pump.tail.chars().all(|c| c == 'é'));
    }
}
