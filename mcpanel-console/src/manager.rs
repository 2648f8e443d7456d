//! Per-target console sessions.
//!
//! The [`ConsoleManager`] owns one console per target id. Each console keeps
//! at most one live connection, serializes connect, disconnect, resize and
//! input, and runs the restart watchdog when a restart is requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use flume::Sender;
use log::{debug, info, warn};
use mcpanel_frame::{Frame, Request, RequestType, Response, encode_request};
use mcpanel_pty::PtySize;
use serde_json::Value;

use crate::bridge::{RconBridge, await_response};
use crate::detect::{MultiplexerSession, detection_command, parse_detection};
use crate::error::{ConsoleError, Result};
use crate::event::{
    ConsoleEvent, ConsoleStatus, Lifecycle, OutputChunk, ReattachReason,
};
use crate::hub::{
    ChannelRecvResult, ChannelRecvTimeoutResult, ChannelTryRecvResult, Hub,
    Subscription,
};
use crate::input::{NamedKey, control_byte};
use crate::launcher::{Launcher, SSH_FAILURE_STATUS, SshLauncher};
use crate::options::ConsoleOptions;
use crate::pump::{self, ActivityClock, PumpExit, PumpHandle, PumpProxy, PumpSinks};
use crate::target::{TargetConfig, TargetId, WrapperMode};
use crate::watchdog::{self, Observation, RestartWatch, Supervised};

/// Owns every managed console, keyed by target id.
pub struct ConsoleManager {
    launcher: Arc<dyn Launcher>,
    options: ConsoleOptions,
    consoles: Mutex<HashMap<TargetId, Arc<Console>>>,
}

impl ConsoleManager {
    /// Manager that connects through the system ssh client.
    pub fn new(options: ConsoleOptions) -> Self {
        let launcher = Arc::new(SshLauncher::new(options.connect_timeout));
        Self::with_launcher(options, launcher)
    }

    pub fn with_launcher(options: ConsoleOptions, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            options,
            consoles: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ConsoleOptions {
        &self.options
    }

    /// Add a target, or replace the settings of a known one. New settings
    /// apply from the next connect.
    pub fn register(&self, id: impl Into<TargetId>, config: TargetConfig) {
        let id = id.into();
        let mut consoles = lock(&self.consoles);

        if let Some(console) = consoles.get(&id) {
            console.update_config(config);
            return;
        }

        let console = Console::new(
            id.clone(),
            config,
            Arc::clone(&self.launcher),
            self.options.clone(),
        );
        consoles.insert(id, console);
    }

    /// Disconnect a target and forget it.
    pub fn remove(&self, id: &TargetId) -> Result<()> {
        let console = lock(&self.consoles)
            .remove(id)
            .ok_or_else(|| ConsoleError::UnknownTarget(id.clone()))?;
        console.disconnect();
        Ok(())
    }

    pub fn targets(&self) -> Vec<TargetId> {
        let mut ids: Vec<_> = lock(&self.consoles).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connect(&self, id: &TargetId) -> Result<()> {
        self.console(id)?.connect()
    }

    /// Drop the connection and cancel any restart watch. Disconnecting an
    /// idle console is a no-op.
    pub fn disconnect(&self, id: &TargetId) -> Result<()> {
        self.console(id)?.disconnect();
        Ok(())
    }

    /// Resize the terminal. While disconnected the size is kept for the
    /// next connect.
    pub fn resize(&self, id: &TargetId, rows: u16, cols: u16) -> Result<()> {
        self.console(id)?.resize(rows, cols)
    }

    pub fn send_text(&self, id: &TargetId, text: &str) -> Result<()> {
        self.console(id)?.send(text.as_bytes().to_vec())
    }

    /// Send `Ctrl+<key>`.
    pub fn send_control(&self, id: &TargetId, key: char) -> Result<()> {
        let byte = control_byte(key)?;
        self.console(id)?.send(vec![byte])
    }

    pub fn send_key(&self, id: &TargetId, key: NamedKey) -> Result<()> {
        self.console(id)?.send(key.sequence().as_bytes().to_vec())
    }

    /// Type a console command followed by Enter. Restart and stop commands
    /// also start the restart watchdog.
    pub fn send_command(&self, id: &TargetId, command: &str) -> Result<()> {
        self.console(id)?.send_command(command)
    }

    /// Start watching for the server to come back after a restart.
    pub fn request_restart(&self, id: &TargetId) -> Result<()> {
        self.console(id)?.request_restart()
    }

    pub fn status(&self, id: &TargetId) -> Result<ConsoleStatus> {
        Ok(self.console(id)?.status())
    }

    /// Output of the current connection. The stream ends when that
    /// connection does.
    pub fn subscribe_output(&self, id: &TargetId) -> Result<OutputStream> {
        self.console(id)?.subscribe_output()
    }

    /// Bridge messages of every connection of the target.
    pub fn subscribe_messages(&self, id: &TargetId) -> Result<Subscription<Frame>> {
        Ok(self.console(id)?.messages.subscribe())
    }

    pub fn subscribe_events(&self, id: &TargetId) -> Result<Subscription<ConsoleEvent>> {
        Ok(self.console(id)?.events.subscribe())
    }

    /// List the multiplexer sessions running on the target.
    pub fn detect_sessions(&self, id: &TargetId) -> Result<Vec<MultiplexerSession>> {
        self.console(id)?.detect_sessions()
    }

    /// Send a bridge request through the console and wait for its response.
    pub fn request(
        &self,
        id: &TargetId,
        kind: RequestType,
        payload: Option<Value>,
    ) -> Result<Response> {
        self.console(id)?.request(&Request::new(kind, payload))
    }

    /// Send a bridge request over the target's RCON connection.
    pub fn request_via_rcon(
        &self,
        id: &TargetId,
        kind: RequestType,
        payload: Option<Value>,
    ) -> Result<Response> {
        let config = self.console(id)?.config();
        RconBridge::connect(&config, &self.options)?.request(kind, payload)
    }

    fn console(&self, id: &TargetId) -> Result<Arc<Console>> {
        lock(&self.consoles)
            .get(id)
            .cloned()
            .ok_or_else(|| ConsoleError::UnknownTarget(id.clone()))
    }
}

impl Drop for ConsoleManager {
    fn drop(&mut self) {
        let consoles: Vec<_> = lock(&self.consoles).drain().map(|(_, c)| c).collect();
        for console in consoles {
            console.disconnect();
        }
    }
}

/// Output subscription bound to one connection.
pub struct OutputStream {
    chunks: Subscription<OutputChunk>,
    console: Weak<Console>,
    generation: u64,
}

impl OutputStream {
    pub fn recv(&self) -> ChannelRecvResult<OutputChunk> {
        self.chunks.recv()
    }

    pub async fn recv_async(&self) -> ChannelRecvResult<OutputChunk> {
        self.chunks.recv_async().await
    }

    pub fn try_recv(&self) -> ChannelTryRecvResult<OutputChunk> {
        self.chunks.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> ChannelRecvTimeoutResult<OutputChunk> {
        self.chunks.recv_timeout(timeout)
    }

    pub fn iter(&self) -> impl Iterator<Item = OutputChunk> + '_ {
        self.chunks.iter()
    }

    /// Stop the connection this stream belongs to: reading stops and the
    /// client process is terminated. Dropping the stream only unsubscribes.
    pub fn cancel(self) {
        if let Some(console) = self.console.upgrade() {
            console.cancel_connection(self.generation);
        }
    }
}

struct RestartTicket {
    epoch: u64,
    requested_at: Instant,
    cancel: Sender<()>,
}

struct ConsoleState {
    config: TargetConfig,
    lifecycle: Lifecycle,
    /// Bumped for every connect and teardown; pumps report their end with
    /// the generation they were started with.
    generation: u64,
    ended_generation: u64,
    pump: Option<PumpHandle>,
    connected_at: Option<Instant>,
    size: PtySize,
    restart: Option<RestartTicket>,
    last_epoch: u64,
}

pub(crate) struct Console {
    id: TargetId,
    launcher: Arc<dyn Launcher>,
    options: ConsoleOptions,
    weak: Weak<Console>,
    /// Held for the whole of connect, disconnect, resize and send.
    ops: Mutex<()>,
    state: Mutex<ConsoleState>,
    activity: Arc<ActivityClock>,
    messages: Arc<Hub<Frame>>,
    events: Hub<ConsoleEvent>,
}

impl Console {
    fn new(
        id: TargetId,
        config: TargetConfig,
        launcher: Arc<dyn Launcher>,
        options: ConsoleOptions,
    ) -> Arc<Self> {
        let size = config.size();
        Arc::new_cyclic(|weak| Self {
            id,
            launcher,
            options,
            weak: weak.clone(),
            ops: Mutex::new(()),
            state: Mutex::new(ConsoleState {
                config,
                lifecycle: Lifecycle::Disconnected,
                generation: 0,
                ended_generation: 0,
                pump: None,
                connected_at: None,
                size,
                restart: None,
                last_epoch: 0,
            }),
            activity: Arc::new(ActivityClock::default()),
            messages: Arc::new(Hub::new()),
            events: Hub::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        lock(&self.state)
    }

    fn ops(&self) -> MutexGuard<'_, ()> {
        lock(&self.ops)
    }

    fn config(&self) -> TargetConfig {
        self.state().config.clone()
    }

    fn update_config(&self, config: TargetConfig) {
        let mut state = self.state();
        state.size = config.size();
        state.config = config;
    }

    fn connect(&self) -> Result<()> {
        let _ops = self.ops();
        self.connect_locked()
    }

    fn connect_locked(&self) -> Result<()> {
        self.teardown_locked();

        let (config, size, generation) = {
            let mut state = self.state();
            state.generation += 1;
            state.lifecycle = Lifecycle::Connecting;
            (state.config.clone(), state.size, state.generation)
        };
        self.events.publish(&ConsoleEvent::Connecting);

        let result = self.start(&config, size, generation);
        if let Err(err) = &result {
            warn!("console {}: connect failed: {err}", self.id);
            let was_connecting = {
                let mut state = self.state();
                let current = state.generation == generation
                    && state.lifecycle != Lifecycle::Disconnected;
                if current {
                    state.lifecycle = Lifecycle::Disconnected;
                    state.connected_at = None;
                    state.pump.take();
                }
                current
            };
            if was_connecting {
                self.events.publish(&ConsoleEvent::Disconnected { exit_code: None });
            }
        }

        result
    }

    fn start(&self, config: &TargetConfig, size: PtySize, generation: u64) -> Result<()> {
        if self.options.verify_session {
            self.verify_session(config)?;
        }

        let session = self.launcher.launch(config, size)?;

        let sinks = PumpSinks {
            activity: Arc::clone(&self.activity),
            messages: Arc::clone(&self.messages),
            output: Arc::new(Hub::new()),
        };
        let weak = self.weak.clone();
        let handle = pump::spawn(
            self.id.as_str(),
            session,
            self.options.read_buffer_capacity,
            sinks,
            move |exit| {
                if let Some(console) = weak.upgrade() {
                    console.connection_ended(generation, exit);
                }
            },
        )?;
        let exit = handle.exit();

        {
            let mut state = self.state();
            if state.ended_generation == generation {
                drop(state);
                return Err(early_exit_error(config, exit.try_recv().ok()));
            }
            state.lifecycle = Lifecycle::Connected;
            state.connected_at = Some(Instant::now());
            state.pump = Some(handle);
        }

        info!("console {}: connected ({:?})", self.id, config.wrapper);
        self.events.publish(&ConsoleEvent::Connected);

        let grace = self.options.attach_grace;
        if !grace.is_zero() {
            if let Ok(exit) = exit.recv_timeout(grace) {
                return Err(early_exit_error(config, Some(exit)));
            }
        }

        Ok(())
    }

    /// Fail fast with `SessionNotFound` when attaching by name to a session
    /// the multiplexer does not list. A failed listing is not an error.
    fn verify_session(&self, config: &TargetConfig) -> Result<()> {
        let multiplexer = match config.wrapper {
            WrapperMode::Screen | WrapperMode::Tmux => config.wrapper.multiplexer(),
            _ => None,
        };
        let (Some(multiplexer), Some(name)) = (multiplexer, config.session()) else {
            return Ok(());
        };

        let output = match self.launcher.query(config, &detection_command()) {
            Ok(output) => output,
            Err(err) => {
                warn!("console {}: session check failed, attaching anyway: {err}", self.id);
                return Ok(());
            },
        };

        let found = parse_detection(&output).iter().any(|session| {
            session.multiplexer == multiplexer
                && (session.name == name
                    || session
                        .pid
                        .is_some_and(|pid| format!("{pid}.{}", session.name) == name))
        });

        if found {
            Ok(())
        } else {
            Err(ConsoleError::SessionNotFound(name.to_string()))
        }
    }

    /// Called on the pump thread once a connection is gone.
    fn connection_ended(&self, generation: u64, exit: PumpExit) {
        let ended = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.ended_generation = generation;
            if state.lifecycle == Lifecycle::Disconnected {
                false
            } else {
                state.lifecycle = Lifecycle::Disconnected;
                state.connected_at = None;
                state.pump.take();
                true
            }
        };

        if ended {
            info!(
                "console {}: connection ended (exit code {:?})",
                self.id, exit.exit_code
            );
            self.events.publish(&ConsoleEvent::Disconnected {
                exit_code: exit.exit_code,
            });
        }
    }

    /// Stop the current pump, if any. Requires the ops lock.
    fn teardown_locked(&self) {
        let pump = {
            let mut state = self.state();
            state.generation += 1;
            state.lifecycle = Lifecycle::Disconnected;
            state.connected_at = None;
            state.pump.take()
        };

        if let Some(pump) = pump {
            let exit = pump.exit();
            pump.shutdown();
            let exit_code = exit.try_recv().ok().and_then(|exit| exit.exit_code);
            debug!("console {}: connection closed (exit code {exit_code:?})", self.id);
            self.events.publish(&ConsoleEvent::Disconnected { exit_code });
        }
    }

    fn disconnect(&self) {
        let _ops = self.ops();
        self.cancel_restart();
        self.teardown_locked();
    }

    fn cancel_connection(&self, generation: u64) {
        let _ops = self.ops();
        let current = {
            let state = self.state();
            state.generation == generation && state.pump.is_some()
        };
        if current {
            self.teardown_locked();
        }
    }

    fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(ConsoleError::InvalidInput(format!(
                "terminal size {cols}x{rows} is empty"
            )));
        }

        let _ops = self.ops();
        let size = PtySize::new(rows, cols);
        let proxy = {
            let mut state = self.state();
            state.size = size;
            state.config.rows = rows;
            state.config.cols = cols;
            state.pump.as_ref().map(PumpHandle::proxy)
        };

        if let Some(proxy) = proxy {
            proxy.resize(size)?;
        }
        self.events.publish(&ConsoleEvent::Resized(size));
        Ok(())
    }

    fn proxy(&self) -> Result<PumpProxy> {
        let state = self.state();
        match (&state.lifecycle, &state.pump) {
            (Lifecycle::Connected, Some(pump)) => Ok(pump.proxy()),
            _ => Err(ConsoleError::NotConnected),
        }
    }

    fn send(&self, bytes: Vec<u8>) -> Result<()> {
        let _ops = self.ops();
        self.proxy()?.write(bytes)
    }

    fn send_command(&self, command: &str) -> Result<()> {
        let line = command.trim_end_matches(['\r', '\n']);
        self.send(format!("{line}\r").into_bytes())?;

        if self.options.is_restart_command(line) {
            info!("console {}: `{}` restarts the server", self.id, line.trim());
            self.request_restart()?;
        }

        Ok(())
    }

    fn request(&self, request: &Request) -> Result<Response> {
        let line = encode_request(&self.options.request_command, request)?;
        // Subscribe first so a fast response is not missed.
        let messages = self.messages.subscribe();
        self.send(format!("{line}\r").into_bytes())?;
        await_response(&messages, &request.id, self.options.request_timeout)
    }

    fn detect_sessions(&self) -> Result<Vec<MultiplexerSession>> {
        let config = self.config();
        let output = self.launcher.query(&config, &detection_command())?;
        Ok(parse_detection(&output))
    }

    fn request_restart(&self) -> Result<()> {
        let requested_at = Instant::now();
        let (cancel_tx, cancel_rx) = flume::bounded(1);

        let epoch = {
            let mut state = self.state();
            if let Some(previous) = state.restart.take() {
                let _ = previous.cancel.send(());
            }
            let epoch = state.last_epoch + 1;
            state.last_epoch = epoch;
            state.restart = Some(RestartTicket {
                epoch,
                requested_at,
                cancel: cancel_tx,
            });
            epoch
        };

        self.events.publish(&ConsoleEvent::RestartStarted);

        let watch = RestartWatch {
            requested_at,
            stale_after: self.options.stale_after,
            fresh_within: self.options.fresh_within,
            give_up_after: self.options.watchdog_timeout,
        };

        if let Err(err) = watchdog::spawn(
            self.id.as_str(),
            self.weak.clone(),
            epoch,
            watch,
            self.options.poll_interval,
            cancel_rx,
        ) {
            self.finish_restart(epoch, false);
            return Err(err.into());
        }

        Ok(())
    }

    fn cancel_restart(&self) {
        let ticket = self.state().restart.take();
        if let Some(ticket) = ticket {
            let _ = ticket.cancel.send(());
            debug!("console {}: restart watch {} cancelled", self.id, ticket.epoch);
        }
    }

    fn subscribe_output(&self) -> Result<OutputStream> {
        let state = self.state();
        let pump = state.pump.as_ref().ok_or(ConsoleError::NotConnected)?;

        Ok(OutputStream {
            chunks: pump.output().subscribe(),
            console: self.weak.clone(),
            generation: state.generation,
        })
    }

    fn status(&self) -> ConsoleStatus {
        let state = self.state();
        ConsoleStatus {
            lifecycle: state.lifecycle,
            wrapper: state.config.wrapper,
            session_name: state.config.session().map(str::to_string),
            size: state.size,
            connected_at: state.connected_at,
            last_output_at: self.activity.last(),
            restarting: state.restart.is_some(),
            restart_requested_at: state.restart.as_ref().map(|r| r.requested_at),
        }
    }

    fn is_current_epoch(&self, epoch: u64) -> bool {
        self.state()
            .restart
            .as_ref()
            .is_some_and(|ticket| ticket.epoch == epoch)
    }
}

impl Supervised for Console {
    fn observe(&self, epoch: u64) -> Option<Observation> {
        let state = self.state();
        let ticket = state.restart.as_ref()?;
        if ticket.epoch != epoch {
            return None;
        }

        Some(Observation {
            now: Instant::now(),
            connected: state.lifecycle == Lifecycle::Connected,
            connected_at: state.connected_at,
            last_output: self.activity.last(),
        })
    }

    fn reattach(&self, epoch: u64, reason: ReattachReason) -> Result<()> {
        let _ops = self.ops();
        // A disconnect may have won the race for the lock.
        if !self.is_current_epoch(epoch) {
            return Ok(());
        }

        self.events.publish(&ConsoleEvent::Reattaching(reason));
        self.connect_locked()
    }

    fn finish_restart(&self, epoch: u64, recovered: bool) {
        let finished = {
            let mut state = self.state();
            match &state.restart {
                Some(ticket) if ticket.epoch == epoch => {
                    state.restart = None;
                    true
                },
                _ => false,
            }
        };

        if finished {
            self.events.publish(&ConsoleEvent::RestartFinished { recovered });
        }
    }
}

fn early_exit_error(config: &TargetConfig, exit: Option<PumpExit>) -> ConsoleError {
    let Some(exit) = exit else {
        return ConsoleError::ConnectionFailed(String::from("connection closed"));
    };

    let tail = exit.tail.trim();
    let detail = exit
        .error
        .clone()
        .or_else(|| (!tail.is_empty()).then(|| tail.to_string()))
        .unwrap_or_else(|| match exit.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => String::from("connection closed"),
        });

    match exit.exit_code {
        Some(SSH_FAILURE_STATUS) => ConsoleError::ConnectionFailed(detail),
        _ if config.wrapper.attaches() => ConsoleError::AttachFailed(detail),
        _ => ConsoleError::ConnectionFailed(detail),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
