use std::sync::Mutex;
use std::time::Duration;

use flume::{
    Receiver, RecvTimeoutError as FlumeRecvTimeoutError, Sender,
    TryRecvError as FlumeTryRecvError,
};

/// Error returned when receiving from a closed subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRecvError {
    Disconnected,
}

/// Error returned when a non-blocking receive fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelTryRecvError {
    Empty,
    Disconnected,
}

/// Error returned when a bounded wait fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRecvTimeoutError {
    Timeout,
    Disconnected,
}

pub type ChannelRecvResult<T> = std::result::Result<T, ChannelRecvError>;
pub type ChannelTryRecvResult<T> = std::result::Result<T, ChannelTryRecvError>;
pub type ChannelRecvTimeoutResult<T> =
    std::result::Result<T, ChannelRecvTimeoutError>;

/// Fan-out of values to any number of unbounded subscribers.
///
/// Subscribers that went away are pruned on the next publish. Closing the
/// hub ends every subscription once its queue is drained.
#[derive(Debug)]
pub(crate) struct Hub<T> {
    senders: Mutex<Option<Vec<Sender<T>>>>,
}

impl<T: Clone> Hub<T> {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Some(Vec::new())),
        }
    }

    pub(crate) fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut senders) = self.senders.lock() {
            if let Some(senders) = senders.as_mut() {
                senders.push(tx);
            }
        }
        Subscription::new(rx)
    }

    pub(crate) fn publish(&self, value: &T) {
        let Ok(mut senders) = self.senders.lock() else {
            return;
        };
        if let Some(senders) = senders.as_mut() {
            senders.retain(|tx| tx.send(value.clone()).is_ok());
        }
    }

    pub(crate) fn close(&self) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.take();
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.senders
            .lock()
            .ok()
            .and_then(|senders| senders.as_ref().map(Vec::len))
            .unwrap_or(0)
    }
}

/// Receiving end of a [`Hub`] with sync and async helpers.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: Receiver<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(receiver: Receiver<T>) -> Self {
        Self { receiver }
    }

    /// Blocking receive.
    pub fn recv(&self) -> ChannelRecvResult<T> {
        self.receiver
            .recv()
            .map_err(|_| ChannelRecvError::Disconnected)
    }

    /// Async receive.
    pub async fn recv_async(&self) -> ChannelRecvResult<T> {
        self.receiver
            .recv_async()
            .await
            .map_err(|_| ChannelRecvError::Disconnected)
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> ChannelTryRecvResult<T> {
        self.receiver.try_recv().map_err(|err| match err {
            FlumeTryRecvError::Empty => ChannelTryRecvError::Empty,
            FlumeTryRecvError::Disconnected => ChannelTryRecvError::Disconnected,
        })
    }

    /// Blocking receive bounded by `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> ChannelRecvTimeoutResult<T> {
        self.receiver.recv_timeout(timeout).map_err(|err| match err {
            FlumeRecvTimeoutError::Timeout => ChannelRecvTimeoutError::Timeout,
            FlumeRecvTimeoutError::Disconnected => {
                ChannelRecvTimeoutError::Disconnected
            },
        })
    }

    /// Blocking iterator that ends when the source closes.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.receiver.iter()
    }

    /// Values queued right now.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.drain().collect()
    }
}
