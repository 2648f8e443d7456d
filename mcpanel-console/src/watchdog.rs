//! Restart recovery.
//!
//! After a restart is requested, a watchdog thread polls its console and
//! repairs the connection until fresh output shows the server is back, or
//! until the overall bound runs out. The decision logic lives in
//! [`RestartWatch`] and only looks at timestamps, so it is tested without
//! threads or clocks.

use std::sync::Weak;
use std::thread;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};

use crate::error::Result;
use crate::event::ReattachReason;

/// What the watchdog sees of a console at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Observation {
    pub now: Instant,
    pub connected: bool,
    pub connected_at: Option<Instant>,
    pub last_output: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Wait,
    Reconnect,
    ForceReattach,
    Recovered,
    GiveUp,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RestartWatch {
    pub requested_at: Instant,
    pub stale_after: Duration,
    pub fresh_within: Duration,
    pub give_up_after: Duration,
}

impl RestartWatch {
    /// Whether the overall bound has run out at `now`.
    pub(crate) fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.requested_at) >= self.give_up_after
    }

    pub(crate) fn evaluate(&self, obs: &Observation) -> Verdict {
        if self.expired(obs.now) {
            return Verdict::GiveUp;
        }

        if !obs.connected {
            return Verdict::Reconnect;
        }

        if let Some(last) = obs.last_output {
            if last > self.requested_at
                && obs.now.duration_since(last) <= self.fresh_within
            {
                return Verdict::Recovered;
            }
        }

        // Silence counts from whatever happened last: output, the current
        // connection or the request itself.
        let quiet_since = [obs.last_output, obs.connected_at]
            .into_iter()
            .flatten()
            .fold(self.requested_at, Instant::max);

        if obs.now.duration_since(quiet_since) > self.stale_after {
            return Verdict::ForceReattach;
        }

        Verdict::Wait
    }
}

/// The console side of a watchdog. Every call names the restart epoch it
/// belongs to; calls for an epoch that is no longer current are ignored.
pub(crate) trait Supervised: Send + Sync + 'static {
    /// `None` once the epoch was cancelled or replaced.
    fn observe(&self, epoch: u64) -> Option<Observation>;

    fn reattach(&self, epoch: u64, reason: ReattachReason) -> Result<()>;

    fn finish_restart(&self, epoch: u64, recovered: bool);
}

/// Run a watch on its own thread. Sending on, or dropping the sender of,
/// `cancel` stops it at the next poll.
pub(crate) fn spawn<S: Supervised>(
    name: &str,
    target: Weak<S>,
    epoch: u64,
    watch: RestartWatch,
    poll_interval: Duration,
    cancel: Receiver<()>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name(format!("mcpanel-watchdog-{name}"))
        .spawn(move || run(target, epoch, watch, poll_interval, cancel))?;
    Ok(())
}

fn run<S: Supervised>(
    target: Weak<S>,
    epoch: u64,
    watch: RestartWatch,
    poll_interval: Duration,
    cancel: Receiver<()>,
) {
    loop {
        match cancel.recv_timeout(poll_interval) {
            Err(RecvTimeoutError::Timeout) => {},
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("restart watch {epoch} cancelled");
                return;
            },
        }

        let Some(target) = target.upgrade() else {
            return;
        };
        let Some(observation) = target.observe(epoch) else {
            return;
        };

        let reason = match watch.evaluate(&observation) {
            Verdict::Wait => continue,
            Verdict::Reconnect => ReattachReason::Lost,
            Verdict::ForceReattach => ReattachReason::Stale,
            Verdict::Recovered => {
                info!("restart watch {epoch}: console recovered");
                target.finish_restart(epoch, true);
                return;
            },
            Verdict::GiveUp => {
                warn!("restart watch {epoch}: giving up");
                target.finish_restart(epoch, false);
                return;
            },
        };

        info!("restart watch {epoch}: reattaching ({reason:?})");
        if let Err(err) = target.reattach(epoch, reason) {
            // A slow attempt may have used up the rest of the bound.
            if watch.expired(Instant::now()) {
                warn!("restart watch {epoch}: reattach failed, giving up: {err}");
                target.finish_restart(epoch, false);
                return;
            }
            warn!("restart watch {epoch}: reattach failed, retrying: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::ConsoleError;

    const SECOND: Duration = Duration::from_secs(1);

    fn watch(requested_at: Instant) -> RestartWatch {
        RestartWatch {
            requested_at,
            stale_after: SECOND * 8,
            fresh_within: SECOND * 3,
            give_up_after: SECOND * 90,
        }
    }

    fn observe(
        now: Instant,
        connected: bool,
        connected_at: Option<Instant>,
        last_output: Option<Instant>,
    ) -> Observation {
        Observation {
            now,
            connected,
            connected_at,
            last_output,
        }
    }

    #[test]
    fn lost_connection_reconnects_right_away() {
        let t0 = Instant::now();
        let verdict = watch(t0).evaluate(&observe(t0 + SECOND, false, None, None));
        assert_eq!(verdict, Verdict::Reconnect);
    }

    #[test]
    fn fresh_output_after_the_request_means_recovered() {
        let t0 = Instant::now();
        let obs = observe(t0 + SECOND * 10, true, Some(t0), Some(t0 + SECOND * 9));
        assert_eq!(watch(t0).evaluate(&obs), Verdict::Recovered);
    }

    #[test]
    fn output_from_before_the_request_does_not_count() {
        let before = Instant::now();
        let t0 = before + SECOND;
        let obs = observe(t0 + SECOND, true, Some(before), Some(before));
        assert_eq!(watch(t0).evaluate(&obs), Verdict::Wait);
    }

    #[test]
    fn silent_live_connection_is_reattached_after_threshold() {
        let t0 = Instant::now();
        let w = watch(t0);

        let quiet = observe(t0 + SECOND * 8, true, Some(t0), None);
        assert_eq!(w.evaluate(&quiet), Verdict::Wait);

        let stale = observe(t0 + SECOND * 9, true, Some(t0), None);
        assert_eq!(w.evaluate(&stale), Verdict::ForceReattach);
    }

    #[test]
    fn a_new_connection_restarts_the_silence_clock() {
        let t0 = Instant::now();
        let obs = observe(t0 + SECOND * 12, true, Some(t0 + SECOND * 10), None);
        assert_eq!(watch(t0).evaluate(&obs), Verdict::Wait);
    }

    #[test]
    fn stale_output_after_the_request_is_not_recovery() {
        let t0 = Instant::now();
        let obs = observe(t0 + SECOND * 20, true, Some(t0), Some(t0 + SECOND));
        assert_eq!(watch(t0).evaluate(&obs), Verdict::ForceReattach);
    }

    #[test]
    fn bound_wins_over_everything() {
        let t0 = Instant::now();
        let now = t0 + SECOND * 90;
        assert_eq!(
            watch(t0).evaluate(&observe(now, false, None, None)),
            Verdict::GiveUp
        );
        assert_eq!(
            watch(t0).evaluate(&observe(now, true, Some(now), Some(now))),
            Verdict::GiveUp
        );
    }

    #[derive(Default)]
    struct Scripted {
        connected: Mutex<bool>,
        reattaches: Mutex<Vec<ReattachReason>>,
        finished: Mutex<Option<bool>>,
    }

    impl Supervised for Scripted {
        fn observe(&self, _epoch: u64) -> Option<Observation> {
            if self.finished.lock().expect("lock").is_some() {
                return None;
            }
            Some(Observation {
                now: Instant::now(),
                connected: *self.connected.lock().expect("lock"),
                connected_at: None,
                last_output: None,
            })
        }

        fn reattach(&self, _epoch: u64, reason: ReattachReason) -> Result<()> {
            self.reattaches.lock().expect("lock").push(reason);
            Err(ConsoleError::ConnectionFailed(String::from("host down")))
        }

        fn finish_restart(&self, _epoch: u64, recovered: bool) {
            *self.finished.lock().expect("lock") = Some(recovered);
        }
    }

    #[test]
    fn silent_target_gives_up_within_the_bound() {
        let target = Arc::new(Scripted::default());
        let (_cancel_tx, cancel_rx) = flume::unbounded();
        let started = Instant::now();
        let w = RestartWatch {
            requested_at: started,
            stale_after: Duration::from_millis(40),
            fresh_within: Duration::from_millis(20),
            give_up_after: Duration::from_millis(300),
        };

        run(
            Arc::downgrade(&target),
            1,
            w,
            Duration::from_millis(10),
            cancel_rx,
        );

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(*target.finished.lock().expect("lock"), Some(false));

        let reattaches = target.reattaches.lock().expect("lock");
        assert!(!reattaches.is_empty());
        assert!(reattaches.iter().all(|r| *r == ReattachReason::Lost));
    }

    /// Always disconnected; every reattach fails after `delay`.
    struct SlowHost {
        delay: Duration,
        observations: Mutex<usize>,
        reattaches: Mutex<usize>,
        finished: Mutex<Option<bool>>,
    }

    impl Supervised for SlowHost {
        fn observe(&self, _epoch: u64) -> Option<Observation> {
            if self.finished.lock().expect("lock").is_some() {
                return None;
            }
            *self.observations.lock().expect("lock") += 1;
            Some(Observation {
                now: Instant::now(),
                connected: false,
                connected_at: None,
                last_output: None,
            })
        }

        fn reattach(&self, _epoch: u64, _reason: ReattachReason) -> Result<()> {
            *self.reattaches.lock().expect("lock") += 1;
            thread::sleep(self.delay);
            Err(ConsoleError::ConnectionFailed(String::from("timed out")))
        }

        fn finish_restart(&self, _epoch: u64, recovered: bool) {
            *self.finished.lock().expect("lock") = Some(recovered);
        }
    }

    #[test]
    fn failed_reattach_past_the_bound_gives_up_at_once() {
        let target = Arc::new(SlowHost {
            delay: Duration::from_millis(300),
            observations: Mutex::new(0),
            reattaches: Mutex::new(0),
            finished: Mutex::new(None),
        });
        let (_cancel_tx, cancel_rx) = flume::unbounded();
        let w = RestartWatch {
            requested_at: Instant::now(),
            stale_after: Duration::from_secs(8),
            fresh_within: Duration::from_secs(3),
            give_up_after: Duration::from_millis(100),
        };

        run(
            Arc::downgrade(&target),
            1,
            w,
            Duration::from_millis(20),
            cancel_rx,
        );

        assert_eq!(*target.finished.lock().expect("lock"), Some(false));
        assert_eq!(*target.reattaches.lock().expect("lock"), 1);
        assert_eq!(*target.observations.lock().expect("lock"), 1);
    }

    #[test]
    fn cancelled_watch_stops_without_finishing() {
        let target = Arc::new(Scripted::default());
        let (cancel_tx, cancel_rx) = flume::unbounded();
        cancel_tx.send(()).expect("cancel");

        run(
            Arc::downgrade(&target),
            1,
            watch(Instant::now()),
            Duration::from_millis(10),
            cancel_rx,
        );

        assert_eq!(*target.finished.lock().expect("lock"), None);
        assert!(target.reattaches.lock().expect("lock").is_empty());
    }
}
