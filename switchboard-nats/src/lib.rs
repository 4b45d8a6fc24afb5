//! NATS bus transport for `switchboard` (companion crate).
//!
//! Plugs a `nats` connection in under the typed message layer:
//!
//! ```toml
//! switchboard-nats = { version = "0.1" }
//! ```
//!
//! ```rust,no_run
//! use switchboard::messaging::MessageBus;
//! use switchboard_nats::NatsTransport;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = NatsTransport::connect("nats://127.0.0.1:4222").await?;
//! let bus = MessageBus::new(transport)?;
//! # let _ = bus;
//! # Ok(()) }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use switchboard::bus::subject::{validate_pattern, validate_subject};
use switchboard::bus::{
    BusError, BusTransport, RawMessage, RawSubscription, SubscriptionId, DEFAULT_CHANNEL_CAPACITY,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type StopSignals = Arc<Mutex<HashMap<SubscriptionId, oneshot::Sender<()>>>>;

/// [`BusTransport`] backed by a NATS connection.
///
/// Each subscription is forwarded by its own task into a bounded channel.
/// `max_messages` is enforced by that task: after N deliveries it
/// unsubscribes from NATS and closes the channel.
#[derive(Clone)]
pub struct NatsTransport {
    client: nats::asynk::Connection,
    next_id: Arc<AtomicU64>,
    stops: StopSignals,
    capacity: usize,
}

impl NatsTransport {
    /// Connect to `url` (e.g. `nats://127.0.0.1:4222`).
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = nats::asynk::connect(url).await.map_err(io_err)?;
        Ok(Self::new(client))
    }

    /// Wrap an existing connection.
    pub fn new(client: nats::asynk::Connection) -> Self {
        Self {
            client,
            next_id: Arc::new(AtomicU64::new(1)),
            stops: Arc::new(Mutex::new(HashMap::new())),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Per-subscription delivery buffer size.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Underlying connection.
    pub fn client(&self) -> &nats::asynk::Connection {
        &self.client
    }

    /// Flush pending publishes to the server.
    pub async fn flush(&self) -> Result<(), BusError> {
        self.client.flush().await.map_err(io_err)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.stops.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for NatsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsTransport")
            .field("subscriptions", &self.subscription_count())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

fn io_err(err: std::io::Error) -> BusError {
    BusError::Io(err.to_string())
}

#[async_trait]
impl BusTransport for NatsTransport {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        reply_to: Option<&str>,
    ) -> Result<(), BusError> {
        validate_subject(subject)?;
        match reply_to {
            Some(reply) => self.client.publish_request(subject, reply, &payload).await,
            None => self.client.publish(subject, &payload).await,
        }
        .map_err(io_err)
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
        max_messages: Option<u64>,
    ) -> Result<RawSubscription, BusError> {
        validate_pattern(subject)?;
        let sub = match queue_group {
            Some(group) => self.client.queue_subscribe(subject, group).await,
            None => self.client.subscribe(subject).await,
        }
        .map_err(io_err)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stops.lock().unwrap_or_else(PoisonError::into_inner).insert(id, stop_tx);
        tokio::spawn(forward(id, sub, tx, stop_rx, max_messages, self.stops.clone()));
        debug!(target: "switchboard::bus", subject = %subject, sid = id, "nats subscription opened");
        Ok(RawSubscription { id, messages: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        let stop = self
            .stops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(BusError::NotFound(id))?;
        let _ = stop.send(());
        Ok(())
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }
}

async fn forward(
    id: SubscriptionId,
    sub: nats::asynk::Subscription,
    tx: mpsc::Sender<RawMessage>,
    mut stop: oneshot::Receiver<()>,
    max_messages: Option<u64>,
    stops: StopSignals,
) {
    let mut delivered = 0u64;
    loop {
        let next = tokio::select! {
            _ = &mut stop => break,
            next = sub.next() => next,
        };
        let Some(msg) = next else { break };
        let raw = RawMessage {
            subject: msg.subject,
            payload: Bytes::from(msg.data),
            reply_to: msg.reply,
        };
        if tx.send(raw).await.is_err() {
            break;
        }
        delivered += 1;
        if max_messages.is_some_and(|max| delivered >= max) {
            break;
        }
    }
    stops.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    if let Err(e) = sub.unsubscribe().await {
        warn!(target: "switchboard::bus", sid = id, error = %e, "nats unsubscribe failed");
    }
    debug!(target: "switchboard::bus", sid = id, delivered, "nats subscription closed");
}
