//! Typed publish/subscribe over a [`BusTransport`].
//!
//! Each message type maps to one subject through a [`SubjectRegistry`]; bodies
//! travel as JSON with `null` fields omitted, and unknown fields are ignored on
//! decode so older components keep working when messages grow.
//!
//! ```rust
//! use switchboard::bus::InMemoryBus;
//! use switchboard::messages::{RouterRegister, RouterRoute};
//! use switchboard::messaging::{handler_fn, MessageBus, Publication, SubscribeOptions};
//!
//! # async fn demo() -> Result<(), switchboard::MessagingError> {
//! let bus = MessageBus::new(InMemoryBus::new())?;
//! let _sub = bus
//!     .subscribe::<RouterRegister, _>(
//!         SubscribeOptions::new(),
//!         handler_fn(|p: Publication<RouterRegister>| async move {
//!             println!("route for {:?}", p.body().0.uris);
//!             Ok(())
//!         }),
//!     )
//!     .await?;
//! bus.publish(&RouterRegister(RouterRoute::new("10.0.0.5", 8080, ["app.example.com"]))).await?;
//! # Ok(()) }
//! ```

/// Message trait and subject registry.
pub mod message;
/// Decoded inbound messages.
pub mod publication;
/// Live subscriptions and handlers.
pub mod subscription;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::bus::{BusError, BusTransport, RawMessage};
use crate::error::{DecodeError, MessagingError};

pub use message::{Message, NoReply, SubjectRegistry};
pub use publication::Publication;
pub use subscription::{handler_fn, HandlerFn, PublicationHandler, SubscribeOptions, Subscription};

/// Typed messaging facade. Cheap to clone; clones share the transport and registry.
#[derive(Clone)]
pub struct MessageBus {
    transport: Arc<dyn BusTransport>,
    registry: Arc<SubjectRegistry>,
}

impl MessageBus {
    /// Wrap `transport` with the canonical subject registry.
    pub fn new<B: BusTransport>(transport: B) -> Result<Self, MessagingError> {
        Ok(Self::with_registry(Arc::new(transport), SubjectRegistry::builtin()?))
    }

    /// Wrap a shared transport with a caller-built registry.
    pub fn with_registry(transport: Arc<dyn BusTransport>, registry: SubjectRegistry) -> Self {
        Self { transport, registry: Arc::new(registry) }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &Arc<dyn BusTransport> {
        &self.transport
    }

    /// Subject registry in use.
    pub fn registry(&self) -> &SubjectRegistry {
        &self.registry
    }

    /// Publish `body` on its registered subject.
    pub async fn publish<T: Message>(&self, body: &T) -> Result<(), MessagingError> {
        let subject = self.registry.subject_of::<T>()?;
        let payload = Self::encode(subject, body, T::SIGNAL)?;
        self.transport.publish(subject, payload, None).await?;
        debug!(target: "switchboard::bus", subject = %subject, "published");
        Ok(())
    }

    /// Subscribe `handler` to `T`'s subject.
    pub async fn subscribe<T, H>(
        &self,
        options: SubscribeOptions,
        handler: H,
    ) -> Result<Subscription<T>, MessagingError>
    where
        T: Message,
        H: PublicationHandler<T>,
    {
        let subject = self.registry.subject_of::<T>()?.to_string();
        let raw = self
            .transport
            .subscribe(&subject, options.queue_group.as_deref(), options.max_messages)
            .await?;
        Ok(Subscription::start(self.clone(), raw.id, subject, raw.messages, Arc::new(handler)))
    }

    /// Publish `body` and wait for the first reply.
    ///
    /// Resolves with [`MessagingError::Timeout`] when nothing arrives within
    /// `timeout`. Later replies are ignored.
    pub async fn request<T: Message>(
        &self,
        body: &T,
        timeout: Duration,
    ) -> Result<T::Reply, MessagingError> {
        let subject = self.registry.subject_of::<T>()?.to_string();
        let payload = Self::encode(&subject, body, T::SIGNAL)?;
        let inbox = self.transport.new_inbox();
        let mut replies = self.transport.subscribe(&inbox, None, Some(1)).await?;

        let start = Instant::now();
        if let Err(e) = self.transport.publish(&subject, payload, Some(&inbox)).await {
            self.release_inbox(replies.id).await;
            return Err(e.into());
        }
        let outcome = tokio::time::timeout(timeout, replies.messages.recv()).await;
        self.release_inbox(replies.id).await;

        match outcome {
            Ok(Some(raw)) => Ok(Self::decode::<T::Reply>(&raw)?),
            Ok(None) => Err(BusError::Closed.into()),
            Err(_) => Err(MessagingError::Timeout { subject, elapsed: start.elapsed(), timeout }),
        }
    }

    /// Publish `body` and collect every reply that arrives within `window`.
    ///
    /// Undecodable replies are returned as errors alongside the good ones.
    pub async fn request_all<T: Message>(
        &self,
        body: &T,
        window: Duration,
    ) -> Result<Vec<Result<T::Reply, DecodeError>>, MessagingError> {
        let subject = self.registry.subject_of::<T>()?;
        let payload = Self::encode(subject, body, T::SIGNAL)?;
        let inbox = self.transport.new_inbox();
        let mut replies = self.transport.subscribe(&inbox, None, None).await?;

        if let Err(e) = self.transport.publish(subject, payload, Some(&inbox)).await {
            self.release_inbox(replies.id).await;
            return Err(e.into());
        }
        let deadline = tokio::time::Instant::now() + window;
        let mut collected = Vec::new();
        while let Ok(Some(raw)) = tokio::time::timeout_at(deadline, replies.messages.recv()).await {
            collected.push(Self::decode::<T::Reply>(&raw));
        }
        self.release_inbox(replies.id).await;
        Ok(collected)
    }

    async fn release_inbox(&self, id: crate::bus::SubscriptionId) {
        if let Err(e) = self.transport.unsubscribe(id).await {
            debug!(target: "switchboard::bus", sid = id, error = %e, "inbox already released");
        }
    }

    /// Serialize `body` to JSON without `null` fields; signals encode as an
    /// empty payload.
    pub(crate) fn encode<B: Serialize + ?Sized>(
        subject: &str,
        body: &B,
        signal: bool,
    ) -> Result<Bytes, MessagingError> {
        if signal {
            return Ok(Bytes::new());
        }
        let encode_err =
            |e: serde_json::Error| MessagingError::Encode { subject: subject.to_string(), reason: e.to_string() };
        let mut value = serde_json::to_value(body).map_err(encode_err)?;
        strip_nulls(&mut value);
        serde_json::to_vec(&value).map(Bytes::from).map_err(encode_err)
    }

    /// Deserialize a payload; an empty payload decodes as `{}`.
    pub(crate) fn decode<R: DeserializeOwned>(raw: &RawMessage) -> Result<R, DecodeError> {
        let bytes: &[u8] = if raw.payload.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &raw.payload
        };
        serde_json::from_slice(bytes).map_err(|e| DecodeError::new(&raw.subject, e))
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus").field("registry", &self.registry).finish_non_exhaustive()
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}
