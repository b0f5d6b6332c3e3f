//! # socket-bus
//!
//! Multicast publish points for `tradefeed-socket`.
//!
//! - [`StateBus`] replays the latest value to every new subscriber, then
//!   delivers every later value.
//! - [`MessageBus`] has no replay; a subscriber sees only what is published
//!   after it attached.
//!
//! Both buses give each subscriber its own unbounded queue and publish under a
//! single lock, so all subscribers observe one total order even when several
//! tasks publish concurrently. No value is skipped for an attached subscriber.

mod broadcaster;
mod iter;
mod stream;

pub use broadcaster::{MessageBus, StateBus};
pub use iter::{BlockingIter, TryIter};
pub use stream::BusStream;
