use std::time::Duration;

use tracing::warn;

use super::{Message, MessageBus};
use crate::bus::RawMessage;
use crate::error::MessagingError;

/// One decoded inbound message plus the ability to answer it.
#[derive(Clone)]
pub struct Publication<T: Message> {
    raw: RawMessage,
    body: T,
    bus: MessageBus,
}

impl<T: Message> Publication<T> {
    pub(crate) fn new(raw: RawMessage, body: T, bus: MessageBus) -> Self {
        Self { raw, body, bus }
    }

    /// Decoded body.
    pub fn body(&self) -> &T {
        &self.body
    }

    /// Take ownership of the decoded body.
    pub fn into_body(self) -> T {
        self.body
    }

    /// Concrete subject the message arrived on.
    pub fn subject(&self) -> &str {
        &self.raw.subject
    }

    /// Reply subject set by the sender, if any.
    pub fn reply_to(&self) -> Option<&str> {
        self.raw.reply_to.as_deref()
    }

    /// The message as the transport delivered it.
    pub fn raw(&self) -> &RawMessage {
        &self.raw
    }

    /// Encode `value` and publish it on the sender's reply subject.
    pub async fn reply(&self, value: &T::Reply) -> Result<(), MessagingError> {
        let reply_to = self.reply_subject()?;
        let payload = MessageBus::encode(reply_to, value, false)?;
        self.bus.transport().publish(reply_to, payload, None).await?;
        Ok(())
    }

    /// Like [`reply`](Self::reply) but published after `delay` on a background
    /// task. Encoding happens immediately; a failed publish is logged.
    pub fn reply_after(&self, value: &T::Reply, delay: Duration) -> Result<(), MessagingError> {
        let reply_to = self.reply_subject()?.to_string();
        let payload = MessageBus::encode(&reply_to, value, false)?;
        let transport = self.bus.transport().clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = transport.publish(&reply_to, payload, None).await {
                warn!(target: "switchboard::bus", subject = %reply_to, error = %e, "delayed reply failed");
            }
        });
        Ok(())
    }

    fn reply_subject(&self) -> Result<&str, MessagingError> {
        self.raw
            .reply_to
            .as_deref()
            .ok_or_else(|| MessagingError::NoReplySubject(self.raw.subject.clone()))
    }
}

impl<T: Message + std::fmt::Debug> std::fmt::Debug for Publication<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publication")
            .field("subject", &self.raw.subject)
            .field("reply_to", &self.raw.reply_to)
            .field("body", &self.body)
            .finish()
    }
}
