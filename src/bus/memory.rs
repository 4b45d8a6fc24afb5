use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::subject::{matches, validate_pattern, validate_subject};
use super::{
    BusError, BusTransport, RawMessage, RawSubscription, SubscriptionId, DEFAULT_CHANNEL_CAPACITY,
};

/// In-process bus with NATS subject semantics.
///
/// - `*` matches one subject token, `>` matches the remaining tokens.
/// - Plain subscribers all receive every matching message (fan-out).
/// - Subscribers sharing a queue group on the same subject receive each
///   message exactly once between them, round-robin.
/// - Delivery is best effort: a subscriber whose buffer is full misses the
///   message rather than stalling the publisher.
///
/// Clones share the same bus.
#[derive(Clone, Debug)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    next_id: AtomicU64,
    capacity: usize,
}

#[derive(Debug, Default)]
struct State {
    closed: bool,
    entries: BTreeMap<SubscriptionId, Entry>,
    // (subject pattern, queue group) -> next member index
    cursors: HashMap<(String, String), usize>,
}

#[derive(Debug)]
struct Entry {
    pattern: String,
    queue_group: Option<String>,
    remaining: Option<u64>,
    tx: mpsc::Sender<RawMessage>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Create a bus with the default per-subscription buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus whose subscriptions buffer up to `capacity` messages each.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// Shut the bus down: every registration is dropped and further
    /// operations fail with [`BusError::Closed`].
    pub fn close(&self) {
        if let Ok(mut state) = self.lock() {
            state.closed = true;
            state.entries.clear();
            state.cursors.clear();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BusError> {
        self.inner.state.lock().map_err(|_| BusError::Io("bus state lock poisoned".into()))
    }
}

impl State {
    /// Pick the recipients for one message: every plain subscriber plus one
    /// member per queue group.
    fn recipients(&mut self, subject: &str) -> Vec<SubscriptionId> {
        let mut plain = Vec::new();
        let mut groups: BTreeMap<(String, String), Vec<SubscriptionId>> = BTreeMap::new();
        for (id, entry) in &self.entries {
            if !matches(&entry.pattern, subject) {
                continue;
            }
            match &entry.queue_group {
                None => plain.push(*id),
                Some(group) => {
                    groups.entry((entry.pattern.clone(), group.clone())).or_default().push(*id)
                }
            }
        }
        for (key, members) in groups {
            let cursor = self.cursors.entry(key).or_insert(0);
            plain.push(members[*cursor % members.len()]);
            *cursor = cursor.wrapping_add(1);
        }
        plain
    }
}

#[async_trait]
impl BusTransport for InMemoryBus {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        reply_to: Option<&str>,
    ) -> Result<(), BusError> {
        validate_subject(subject)?;
        let mut state = self.lock()?;
        if state.closed {
            return Err(BusError::Closed);
        }

        let message = RawMessage {
            subject: subject.to_string(),
            payload,
            reply_to: reply_to.map(str::to_string),
        };
        let recipients = state.recipients(subject);
        if recipients.is_empty() {
            debug!(target: "switchboard::bus", subject = %subject, "no subscribers; message dropped");
            return Ok(());
        }

        for id in recipients {
            let Some(entry) = state.entries.get_mut(&id) else { continue };
            let mut drop_entry = false;
            match entry.tx.try_send(message.clone()) {
                Ok(()) => {
                    if let Some(remaining) = entry.remaining.as_mut() {
                        *remaining = remaining.saturating_sub(1);
                        drop_entry = *remaining == 0;
                    }
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(target: "switchboard::bus", subject = %subject, sid = id, "subscriber buffer full; message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => drop_entry = true,
            }
            if drop_entry {
                state.entries.remove(&id);
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: Option<&str>,
        max_messages: Option<u64>,
    ) -> Result<RawSubscription, BusError> {
        validate_pattern(subject)?;
        let mut state = self.lock()?;
        if state.closed {
            return Err(BusError::Closed);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        state.entries.insert(
            id,
            Entry {
                pattern: subject.to_string(),
                queue_group: queue_group.map(str::to_string),
                remaining: max_messages.filter(|m| *m > 0),
                tx,
            },
        );
        debug!(target: "switchboard::bus", subject = %subject, queue = ?queue_group, sid = id, "subscribed");
        Ok(RawSubscription { id, messages: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        let mut state = self.lock()?;
        match state.entries.remove(&id) {
            Some(entry) => {
                debug!(target: "switchboard::bus", subject = %entry.pattern, sid = id, "unsubscribed");
                Ok(())
            }
            None => Err(BusError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_to_plain_subscribers() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("router.register", None, None).await.unwrap();
        let mut b = bus.subscribe("router.*", None, None).await.unwrap();

        bus.publish("router.register", Bytes::from_static(b"{}"), None).await.unwrap();

        assert_eq!(a.messages.recv().await.unwrap().subject, "router.register");
        assert_eq!(b.messages.recv().await.unwrap().subject, "router.register");
    }

    #[tokio::test]
    async fn queue_group_delivers_once_round_robin() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("work", Some("q"), None).await.unwrap();
        let mut b = bus.subscribe("work", Some("q"), None).await.unwrap();

        for _ in 0..4 {
            bus.publish("work", Bytes::new(), None).await.unwrap();
        }

        let mut got_a = 0;
        while a.messages.try_recv().is_ok() {
            got_a += 1;
        }
        let mut got_b = 0;
        while b.messages.try_recv().is_ok() {
            got_b += 1;
        }
        assert_eq!(got_a, 2);
        assert_eq!(got_b, 2);
    }

    #[tokio::test]
    async fn max_messages_drops_registration() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("once", None, Some(1)).await.unwrap();
        bus.publish("once", Bytes::from_static(b"1"), None).await.unwrap();
        bus.publish("once", Bytes::from_static(b"2"), None).await.unwrap();

        assert_eq!(sub.messages.recv().await.unwrap().payload, Bytes::from_static(b"1"));
        assert!(sub.messages.recv().await.is_none(), "channel closes after the limit");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("x.y", None, None).await.unwrap();
        bus.unsubscribe(sub.id).await.unwrap();
        bus.publish("x.y", Bytes::new(), None).await.unwrap();
        assert!(sub.messages.recv().await.is_none());
        assert_eq!(bus.unsubscribe(sub.id).await, Err(BusError::NotFound(sub.id)));
    }

    #[tokio::test]
    async fn reply_subject_is_carried() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("req", None, None).await.unwrap();
        bus.publish("req", Bytes::new(), Some("_INBOX.1")).await.unwrap();
        assert_eq!(sub.messages.recv().await.unwrap().reply_to.as_deref(), Some("_INBOX.1"));
    }

    #[tokio::test]
    async fn closed_bus_rejects_operations() {
        let bus = InMemoryBus::new();
        bus.close();
        assert_eq!(bus.publish("a", Bytes::new(), None).await, Err(BusError::Closed));
        assert!(matches!(bus.subscribe("a", None, None).await, Err(BusError::Closed)));
    }

    #[tokio::test]
    async fn publishing_to_wildcard_is_rejected() {
        let bus = InMemoryBus::new();
        let err = bus.publish("router.*", Bytes::new(), None).await.unwrap_err();
        assert!(matches!(err, BusError::InvalidSubject(_)));
    }
}
