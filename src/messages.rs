//! Canonical platform messages and their subjects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MessagingError;
use crate::messaging::{Message, NoReply, SubjectRegistry};

/// Subject components listen on for discovery requests.
pub const COMPONENT_DISCOVER: &str = "vcap.component.discover";
/// Subject components announce themselves on.
pub const COMPONENT_ANNOUNCE: &str = "vcap.component.announce";
/// Router route registration.
pub const ROUTER_REGISTER: &str = "router.register";
/// Router route removal.
pub const ROUTER_UNREGISTER: &str = "router.unregister";
/// Router startup broadcast.
pub const ROUTER_START: &str = "router.start";
/// Request for routers to (re)send `router.start`.
pub const ROUTER_GREET: &str = "router.greet";

/// Register every canonical message on its subject.
pub fn register_builtin(registry: &mut SubjectRegistry) -> Result<(), MessagingError> {
    registry
        .register::<ComponentDiscover>(COMPONENT_DISCOVER)?
        .register::<ComponentAnnounce>(COMPONENT_ANNOUNCE)?
        .register::<RouterRegister>(ROUTER_REGISTER)?
        .register::<RouterUnregister>(ROUTER_UNREGISTER)?
        .register::<RouterStart>(ROUTER_START)?
        .register::<RouterGreet>(ROUTER_GREET)?;
    Ok(())
}

/// Ask every live component to describe itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDiscover {}

impl Message for ComponentDiscover {
    type Reply = ComponentAnnounce;
    const SIGNAL: bool = true;
}

/// A component's self-description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAnnounce {
    /// Component kind, e.g. `"ServiceBroker"`.
    #[serde(rename = "type")]
    pub component_type: String,
    /// Instance index. Always 0.
    pub index: u32,
    /// Process-lifetime identifier.
    pub uuid: String,
    /// `ip:port` of the component's HTTP endpoint.
    pub host: String,
    /// Basic-auth `[username, password]` for `/varz` and `/healthz`.
    pub credentials: (String, String),
    /// Process start time.
    pub start: String,
    /// Elapsed time since start, `"{d}d:{h}h:{m}m:{s}s"`.
    pub uptime: String,
}

impl Message for ComponentAnnounce {
    type Reply = NoReply;
}

/// Route description shared by router registration messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterRoute {
    /// Backend address.
    pub host: String,
    pub port: u16,
    /// Hostnames routed to the backend.
    pub uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_instance_id: Option<String>,
}

impl RouterRoute {
    /// Route `uris` to `host:port`.
    pub fn new<I, S>(host: impl Into<String>, port: u16, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            host: host.into(),
            port,
            uris: uris.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Attach the owning application id.
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Attach a routing tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());
        self
    }
}

/// Add routes to the router.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterRegister(pub RouterRoute);

impl Message for RouterRegister {
    type Reply = NoReply;
}

/// Remove routes from the router.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterUnregister(pub RouterRoute);

impl Message for RouterUnregister {
    type Reply = NoReply;
}

impl From<RouterRegister> for RouterUnregister {
    fn from(register: RouterRegister) -> Self {
        Self(register.0)
    }
}

/// Sent by a router on startup (and in reply to a greet).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStart {
    pub id: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(
        rename = "minimumRegisterIntervalInSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub minimum_register_interval_in_seconds: Option<u64>,
}

impl Message for RouterStart {
    type Reply = NoReply;
}

/// Ask routers to reply with their `RouterStart`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterGreet {}

impl Message for RouterGreet {
    type Reply = RouterStart;
    const SIGNAL: bool = true;
}
