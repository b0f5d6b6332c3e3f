//! Blocking iteration over a bus subscription
//!
//! For UI threads and other code that runs outside the async runtime.

use tokio::sync::mpsc;

/// Blocking iterator over bus values.
///
/// `next()` parks the calling thread until a value arrives or the bus is gone.
/// Must not be driven from inside an async task.
pub struct BlockingIter<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> BlockingIter<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self { rx }
    }

    /// Block until a value is available
    ///
    /// Returns `None` once the bus is gone.
    pub fn recv(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }

    /// Take the next value without blocking
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Non-blocking iterator over values already queued
    pub fn try_iter(&mut self) -> TryIter<'_, T> {
        TryIter { inner: self }
    }
}

impl<T> Iterator for BlockingIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Drains values that are already queued, then stops.
pub struct TryIter<'a, T> {
    inner: &'a mut BlockingIter<T>,
}

impl<'a, T> Iterator for TryIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}
