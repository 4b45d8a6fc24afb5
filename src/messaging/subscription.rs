use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Message, MessageBus, Publication};
use crate::bus::{BusTransport, RawMessage, SubscriptionId};
use crate::error::{DecodeError, MessagingError};

/// Receives decoded publications for one message type.
#[async_trait]
pub trait PublicationHandler<T: Message>: Send + Sync + 'static {
    /// Handle one decoded message.
    async fn handle(&self, publication: Publication<T>) -> Result<(), MessagingError>;

    /// Called when an inbound payload on the subscription fails to decode.
    async fn on_decode_error(&self, error: &DecodeError) {
        warn!(target: "switchboard::bus", subject = %error.subject, reason = %error.reason, "dropping undecodable message");
    }
}

/// Adapt an async closure into a [`PublicationHandler`].
pub fn handler_fn<T, F, Fut>(f: F) -> HandlerFn<T, F>
where
    T: Message,
    F: Fn(Publication<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), MessagingError>> + Send + 'static,
{
    HandlerFn { f, _marker: PhantomData }
}

/// Handler returned by [`handler_fn`].
pub struct HandlerFn<T, F> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

#[async_trait]
impl<T, F, Fut> PublicationHandler<T> for HandlerFn<T, F>
where
    T: Message,
    F: Fn(Publication<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), MessagingError>> + Send + 'static,
{
    async fn handle(&self, publication: Publication<T>) -> Result<(), MessagingError> {
        (self.f)(publication).await
    }
}

/// Options for [`MessageBus::subscribe`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Competing-consumer group name.
    pub queue_group: Option<String>,
    /// Passed through to the transport: drop the registration after N deliveries.
    pub max_messages: Option<u64>,
}

impl SubscribeOptions {
    /// Fan-out subscription with no delivery limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a queue group.
    pub fn queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }

    /// Limit the number of deliveries.
    pub fn max_messages(mut self, max: u64) -> Self {
        self.max_messages = Some(max);
        self
    }
}

type HandlerChain<T> = Arc<RwLock<Vec<Arc<dyn PublicationHandler<T>>>>>;

/// A live registration for one message type and its chain of handlers.
///
/// Dropping the subscription closes it; [`close`](Self::close) does the same
/// and reports transport errors.
pub struct Subscription<T: Message> {
    id: SubscriptionId,
    subject: String,
    handlers: HandlerChain<T>,
    transport: Arc<dyn BusTransport>,
    pump: Option<JoinHandle<()>>,
}

impl<T: Message> Subscription<T> {
    pub(crate) fn start(
        bus: MessageBus,
        id: SubscriptionId,
        subject: String,
        messages: mpsc::Receiver<RawMessage>,
        first: Arc<dyn PublicationHandler<T>>,
    ) -> Self {
        let handlers: HandlerChain<T> = Arc::new(RwLock::new(vec![first]));
        let transport = bus.transport().clone();
        let pump = tokio::spawn(pump(bus, messages, handlers.clone()));
        Self { id, subject, handlers, transport, pump: Some(pump) }
    }

    /// Transport subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Subject this subscription listens on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Attach another handler; it sees every publication delivered after this call.
    pub fn add_handler<H: PublicationHandler<T>>(&self, handler: H) -> &Self {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).push(Arc::new(handler));
        self
    }

    /// Number of attached handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the delivery loop has ended (closed here or by the transport).
    pub fn is_closed(&self) -> bool {
        self.pump.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Deregister from the bus and release the handlers.
    pub async fn close(mut self) -> Result<(), MessagingError> {
        self.shutdown_local();
        match self.transport.unsubscribe(self.id).await {
            // Already dropped by the transport (max messages, shutdown).
            Ok(()) | Err(crate::bus::BusError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn shutdown_local(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl<T: Message> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.pump.is_none() {
            return;
        }
        self.shutdown_local();
        let transport = self.transport.clone();
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = transport.unsubscribe(id).await;
            });
        }
    }
}

impl<T: Message> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Delivery loop: decode each raw message and hand it to the chain on its own
/// task, so a slow or panicking handler never blocks later deliveries.
async fn pump<T: Message>(
    bus: MessageBus,
    mut messages: mpsc::Receiver<RawMessage>,
    handlers: HandlerChain<T>,
) {
    while let Some(raw) = messages.recv().await {
        let chain: Vec<Arc<dyn PublicationHandler<T>>> =
            handlers.read().unwrap_or_else(PoisonError::into_inner).clone();
        let subject = raw.subject.clone();
        match MessageBus::decode::<T>(&raw) {
            Ok(body) => {
                debug!(target: "switchboard::bus", subject = %subject, "delivering message");
                let publication = Publication::new(raw, body, bus.clone());
                tokio::spawn(async move {
                    for handler in chain {
                        if let Err(e) = handler.handle(publication.clone()).await {
                            warn!(target: "switchboard::bus", subject = %subject, error = %e, "message handler failed");
                        }
                    }
                });
            }
            Err(error) => {
                for handler in chain {
                    handler.on_decode_error(&error).await;
                }
            }
        }
    }
    debug!(target: "switchboard::bus", "subscription drained");
}
