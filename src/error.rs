//! Error types for the bus transport and the typed message layer.
use std::time::Duration;

/// Failures reported by a [`BusTransport`](crate::bus::BusTransport).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BusError {
    /// The transport has been shut down.
    #[error("bus is closed")]
    Closed,
    /// The subject is not a valid dot-segmented subject.
    #[error("invalid subject '{0}'")]
    InvalidSubject(String),
    /// The referenced subscription does not exist (already closed).
    #[error("subscription {0} not found")]
    NotFound(u64),
    /// Underlying I/O or client failure.
    #[error("bus i/o: {0}")]
    Io(String),
}

/// An inbound payload could not be decoded into the registered message type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode message on '{subject}': {reason}")]
pub struct DecodeError {
    /// Subject the payload arrived on.
    pub subject: String,
    /// Decoder diagnostic.
    pub reason: String,
}

impl DecodeError {
    pub(crate) fn new(subject: impl Into<String>, err: serde_json::Error) -> Self {
        Self { subject: subject.into(), reason: err.to_string() }
    }
}

/// Unified error type for the typed message layer.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum MessagingError {
    /// A message type has no (or a conflicting) subject registration.
    #[error("configuration: {0}")]
    Configuration(String),
    /// The outbound body could not be serialized.
    #[error("failed to encode message for '{subject}': {reason}")]
    Encode { subject: String, reason: String },
    /// An inbound body could not be deserialized.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The transport rejected the operation.
    #[error("bus: {0}")]
    Bus(#[from] BusError),
    /// `reply` was called on a message that carries no reply subject.
    #[error("message on '{0}' has no reply subject")]
    NoReplySubject(String),
    /// No reply arrived before the deadline.
    #[error("request on '{subject}' timed out after {elapsed:?} (limit: {timeout:?})")]
    Timeout { subject: String, elapsed: Duration, timeout: Duration },
}

impl MessagingError {
    /// Check if this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is a missing or conflicting subject registration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this error came from decoding an inbound payload.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Access timeout details as (elapsed, limit).
    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { elapsed, timeout, .. } => Some((*elapsed, *timeout)),
            _ => None,
        }
    }

    /// Borrow the transport error if present.
    pub fn as_bus(&self) -> Option<&BusError> {
        match self {
            Self::Bus(e) => Some(e),
            _ => None,
        }
    }
}
