//! Plain configuration values. Loading them (files, env) is left to the caller.

use serde::{Deserialize, Serialize};

/// Realm used in the Basic-auth challenge when none is configured.
pub const DEFAULT_REALM: &str = "switchboard";

/// Settings for a [`Component`](crate::component::Component).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Component kind reported in announces, e.g. `"ServiceBroker"`.
    pub component_type: String,
    /// Advertised `ip:port`. Defaults to the HTTP server's bound address.
    pub host: Option<String>,
    /// Basic-auth realm for `/healthz` and `/varz`.
    pub realm: String,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self { component_type: "Component".into(), host: None, realm: DEFAULT_REALM.into() }
    }
}

impl ComponentConfig {
    /// Defaults for a component of `component_type`.
    pub fn new(component_type: impl Into<String>) -> Self {
        Self { component_type: component_type.into(), ..Self::default() }
    }

    /// Advertise `host` instead of the bound address.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Basic-auth realm for `/healthz` and `/varz`.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }
}

/// Settings for a [`ServiceBroker`](crate::broker::ServiceBroker).
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Shared secret expected in `X-VCAP-Service-Token`.
    pub service_token: String,
}

impl BrokerConfig {
    /// Broker expecting `service_token`.
    pub fn new(service_token: impl Into<String>) -> Self {
        Self { service_token: service_token.into() }
    }

    /// Replace the expected token.
    pub fn with_service_token(mut self, token: impl Into<String>) -> Self {
        self.service_token = token.into();
        self
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig").field("service_token", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_config_fills_defaults() {
        let cfg: ComponentConfig =
            serde_json::from_str(r#"{"component_type":"ServiceBroker"}"#).unwrap();
        assert_eq!(cfg.component_type, "ServiceBroker");
        assert_eq!(cfg.realm, DEFAULT_REALM);
        assert!(cfg.host.is_none());
    }

    #[test]
    fn broker_config_debug_hides_token() {
        let cfg = BrokerConfig::new("s3cret");
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }
}
