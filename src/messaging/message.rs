//! Message types and the static subject registry.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bus::subject::validate_pattern;
use crate::error::MessagingError;

/// A logical message kind carried over the bus as JSON.
///
/// The subject a type travels on is not part of the type: it is looked up in a
/// [`SubjectRegistry`], so a type with no registration is rejected at first use.
pub trait Message: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Type of the reply a receiver may send back. [`NoReply`] means
    /// fire-and-forget: no reply value can be constructed.
    type Reply: Serialize + DeserializeOwned + Send + 'static;

    /// Pure signals carry no payload on the wire.
    const SIGNAL: bool = false;
}

/// Reply type of fire-and-forget messages. Uninhabited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoReply {}

impl Serialize for NoReply {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        match *self {}
    }
}

impl<'de> Deserialize<'de> for NoReply {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
        Err(D::Error::custom("message type declares no reply"))
    }
}

#[derive(Clone, Debug)]
struct Registration {
    subject: String,
    type_name: &'static str,
}

/// Explicit mapping from message type to subject.
///
/// Populated once at startup and treated as read-only afterwards. Registration
/// fails fast on a duplicate type, a subject already claimed by another type, or
/// a malformed subject.
#[derive(Clone, Default)]
pub struct SubjectRegistry {
    by_type: HashMap<TypeId, Registration>,
    by_subject: HashMap<String, &'static str>,
}

impl SubjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the canonical platform messages.
    pub fn builtin() -> Result<Self, MessagingError> {
        let mut registry = Self::new();
        crate::messages::register_builtin(&mut registry)?;
        Ok(registry)
    }

    /// Map `T` to `subject`.
    pub fn register<T: Message>(
        &mut self,
        subject: impl Into<String>,
    ) -> Result<&mut Self, MessagingError> {
        let subject = subject.into();
        let name = type_name::<T>();
        validate_pattern(&subject)
            .map_err(|e| MessagingError::Configuration(format!("{name}: {e}")))?;
        if let Some(existing) = self.by_type.get(&TypeId::of::<T>()) {
            return Err(MessagingError::Configuration(format!(
                "{name} is already registered on '{}'",
                existing.subject
            )));
        }
        if let Some(owner) = self.by_subject.get(&subject) {
            return Err(MessagingError::Configuration(format!(
                "subject '{subject}' is already claimed by {owner}"
            )));
        }
        self.by_subject.insert(subject.clone(), name);
        self.by_type.insert(TypeId::of::<T>(), Registration { subject, type_name: name });
        Ok(self)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: Message>(mut self, subject: impl Into<String>) -> Result<Self, MessagingError> {
        self.register::<T>(subject)?;
        Ok(self)
    }

    /// Subject registered for `T`.
    pub fn subject_of<T: Message>(&self) -> Result<&str, MessagingError> {
        self.by_type.get(&TypeId::of::<T>()).map(|r| r.subject.as_str()).ok_or_else(|| {
            MessagingError::Configuration(format!("no subject registered for {}", type_name::<T>()))
        })
    }

    /// Whether `T` has a registration.
    pub fn contains<T: Message>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Registered subjects (sorted).
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.by_subject.keys().cloned().collect();
        subjects.sort();
        subjects
    }
}

impl fmt::Debug for SubjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&str, &str)> =
            self.by_type.values().map(|r| (r.type_name, r.subject.as_str())).collect();
        entries.sort();
        f.debug_struct("SubjectRegistry").field("registrations", &entries).finish()
    }
}
