//! Idle-flush timer with cancel-and-replace semantics.
//!
//! Each `schedule` call cancels the previously scheduled timer and arms a
//! new one. Cancelling a timer that already fired is a no-op: once the
//! sleep completes, the flush it started is no longer tied to the token.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub(crate) struct IdleTimer {
    interval: Option<Duration>,
    shutdown: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
}

impl IdleTimer {
    /// `None` disables the timer; `schedule` then does nothing.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            shutdown: CancellationToken::new(),
            current: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Arm the timer, replacing any timer armed earlier.
    ///
    /// `fire` runs once the interval elapses without another `schedule`
    /// call or a `shutdown`.
    pub fn schedule<F>(&self, runtime: &Handle, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(interval) = self.interval else {
            return;
        };
        if self.shutdown.is_cancelled() {
            return;
        }

        let token = self.shutdown.child_token();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!("Idle flush timer replaced");
                }
                _ = tokio::time::sleep(interval) => {
                    fire.await;
                }
            }
        });
    }

    /// Cancel the armed timer and refuse to arm new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
