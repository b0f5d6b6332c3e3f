//! Fixed-delay reconnect timers.
//!
//! Each abnormal disconnection schedules exactly one retry. The timer runs on
//! its own task so it never holds up the task delivering transport events.
//! Every scheduled retry carries an epoch; the manager keeps the epoch of the
//! retry it still wants and ignores timers whose epoch no longer matches, which
//! covers a timer that fires in the same instant it is cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Schedules single delayed retries.
pub struct ReconnectScheduler {
    delay: Duration,
    runtime: Handle,
    next_epoch: AtomicU64,
}

impl ReconnectScheduler {
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Run `action` once after the delay, passing it the retry's epoch.
    pub fn schedule<F>(&self, action: F) -> PendingReconnect
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;

        debug!(epoch, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action(epoch);
        });

        PendingReconnect { epoch, task }
    }
}

/// A scheduled retry that has not fired yet.
#[derive(Debug)]
pub struct PendingReconnect {
    epoch: u64,
    task: JoinHandle<()>,
}

impl PendingReconnect {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Stop the timer. A timer that already fired is unaffected.
    pub fn cancel(self) {
        debug!(epoch = self.epoch, "Cancelling reconnect");
        self.task.abort();
    }
}
