//! # Bus
//!
//! Topic-based publish/subscribe over TCP.
//!
//! - [`Broker`]: frontend (publishers) and backend (subscribers) endpoints,
//!   byte-prefix routing, bounded per-subscriber queues
//! - [`Publisher`]: fire-and-forget `[topic, payload]` sends
//! - [`Subscriber`]: acknowledged prefix subscriptions, pull or callback
//!
//! Delivery is at-most-once and there is no reconnection.

mod broker;
mod error;
mod message;
mod publisher;
mod subscriber;
pub mod wire;

pub use broker::{Broker, BrokerHandle};
pub use error::BusError;
pub use message::BusMessage;
pub use publisher::{Publisher, DEFAULT_PUBLISH_QUEUE};
pub use subscriber::{payload_callback, MessageCallback, Subscriber, DEFAULT_ACK_TIMEOUT};
