//! Fan-out broadcasters.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::stream::BusStream;

/// Subscriber queues of one bus.
struct Fanout<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Fanout<T> {
    fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    fn publish(&mut self, value: &T) {
        self.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    }

    fn attach(&mut self, replay: Option<&T>) -> BusStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(value) = replay {
            // Cannot fail: the receiver is still in hand
            let _ = tx.send(value.clone());
        }
        self.subscribers.push(tx);
        BusStream::new(rx)
    }

    fn live_subscribers(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }
}

struct StateInner<T> {
    fanout: Fanout<T>,
    current: T,
}

/// Replay-latest multicast channel.
///
/// A new subscriber first receives the current value, then every value
/// published after it attached.
///
/// # Example
///
/// ```rust
/// use socket_bus::StateBus;
///
/// let bus = StateBus::new("idle");
/// bus.publish("busy");
///
/// let mut late = bus.subscribe();
/// assert_eq!(late.try_recv(), Some("busy"));
/// ```
pub struct StateBus<T> {
    inner: Arc<Mutex<StateInner<T>>>,
}

impl<T: Clone + Send + 'static> StateBus<T> {
    /// Create a bus whose current value is `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StateInner {
                fanout: Fanout::new(),
                current: initial,
            })),
        }
    }

    /// Make `value` current and deliver it to every subscriber.
    pub fn publish(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.fanout.publish(&value);
        inner.current = value;
    }

    /// The most recently published value.
    pub fn current(&self) -> T {
        self.inner.lock().current.clone()
    }

    /// Attach a subscriber. Its first item is the current value.
    pub fn subscribe(&self) -> BusStream<T> {
        let mut inner = self.inner.lock();
        let StateInner { fanout, current } = &mut *inner;
        fanout.attach(Some(current))
    }

    /// Number of subscribers whose stream has not been dropped.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().fanout.live_subscribers()
    }
}

impl<T> Clone for StateBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Multicast channel without replay.
pub struct MessageBus<T> {
    inner: Arc<Mutex<Fanout<T>>>,
}

impl<T: Clone + Send + 'static> MessageBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Fanout::new())),
        }
    }

    /// Deliver `value` to every current subscriber.
    pub fn publish(&self, value: T) {
        self.inner.lock().publish(&value);
    }

    /// Attach a subscriber that sees only later values.
    pub fn subscribe(&self) -> BusStream<T> {
        self.inner.lock().attach(None)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().live_subscribers()
    }
}

impl<T: Clone + Send + 'static> Default for MessageBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MessageBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
