//! Bus transport boundary.
//!
//! The message bus itself (connect/reconnect, wire framing) lives outside this
//! crate. Everything above it talks to a [`BusTransport`]: publish raw bytes on a
//! subject, subscribe with an optional queue group, unsubscribe. [`InMemoryBus`]
//! is the in-process implementation used by tests, demos and single-node setups;
//! `switchboard-nats` provides the NATS-backed one.

/// In-process transport.
pub mod memory;
/// Subject validation and wildcard matching.
pub mod subject;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub use crate::error::BusError;
pub use memory::InMemoryBus;

/// Transport-assigned subscription identifier.
pub type SubscriptionId = u64;

/// Default per-subscription delivery buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// One message as the transport delivers it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    /// Concrete subject the message was published on.
    pub subject: String,
    /// Payload bytes (empty for signal messages).
    pub payload: Bytes,
    /// Subject replies should be published to, if the sender expects one.
    pub reply_to: Option<String>,
}

impl RawMessage {
    /// Build a message without a reply subject.
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { subject: subject.into(), payload: payload.into(), reply_to: None }
    }
}

/// A live registration with the transport.
///
/// Deliveries arrive on `messages`; the channel closes when the transport drops
/// the registration (unsubscribe, max messages reached, or transport shutdown).
#[derive(Debug)]
pub struct RawSubscription {
    /// Identifier to pass to [`BusTransport::unsubscribe`].
    pub id: SubscriptionId,
    /// Inbound deliveries.
    pub messages: mpsc::Receiver<RawMessage>,
}

/// Black-box pub/sub primitive.
///
/// Implementations provide best-effort, at-most-once delivery per subscriber.
/// Subscribers sharing a queue group on the same subject compete for each
/// message; subscribers without a queue group all receive every message.
#[async_trait]
pub trait BusTransport: Send + Sync + 'static {
    /// Publish `payload` on `subject`, optionally naming a reply subject.
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        reply_to: Option<&str>,
    ) -> Result<(), BusError>;

    /// Register interest in `subject`.
    ///
    /// `max_messages` is passed through to the transport, which drops the
    /// registration after that many deliveries.
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
        max_messages: Option<u64>,
    ) -> Result<RawSubscription, BusError>;

    /// Drop a registration. No deliveries follow a successful call.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError>;

    /// A fresh, unique subject suitable for receiving replies.
    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", uuid::Uuid::new_v4().simple())
    }
}
