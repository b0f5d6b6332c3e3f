//! Subscriber side of a bus.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;

use crate::iter::BlockingIter;

/// One subscriber's view of a bus.
///
/// Forward-only and unbuffered with respect to other subscribers: each
/// `BusStream` drains its own queue. The stream ends once every handle to the
/// bus has been dropped.
pub struct BusStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> BusStream<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx }
    }

    /// Wait for the next value.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next value for at most `timeout`.
    ///
    /// Returns `None` on timeout or once the bus is gone.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Convert into a blocking iterator for threads outside the async runtime.
    pub fn blocking_iter(self) -> BlockingIter<T> {
        BlockingIter::new(self.rx)
    }
}

impl<T> Stream for BusStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for BusStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusStream")
            .field("closed", &self.rx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageBus;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_yields_published_values() {
        let bus = MessageBus::new();
        let mut stream = bus.subscribe();

        bus.publish(1);
        bus.publish(2);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_stream_ends_when_bus_dropped() {
        let bus = MessageBus::<u32>::new();
        let mut stream = bus.subscribe();
        drop(bus);

        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_on_idle_bus() {
        let bus = MessageBus::<u32>::new();
        let mut stream = bus.subscribe();

        let start = tokio::time::Instant::now();
        assert_eq!(stream.recv_timeout(Duration::from_millis(50)).await, None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
