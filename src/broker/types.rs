use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which instance and binding ids are merged into `configuration`.
pub const SERVICE_ID_KEY: &str = "service_id";
/// Key under which the binding id is merged into a bind response.
pub const BINDING_ID_KEY: &str = "binding_id";

/// Body of `POST /gateway/v1/configurations`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Service label, e.g. `"postgresql-9.6"`.
    pub label: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

impl CreateRequest {
    /// Request for `plan` of service `label`.
    pub fn new(label: impl Into<String>, plan: impl Into<String>) -> Self {
        Self { label: label.into(), plan: plan.into(), ..Self::default() }
    }
}

/// Body of `POST /gateway/v1/configurations/{id}/handles`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BindRequest {
    /// Instance to bind. Overwritten by the id in the request path.
    #[serde(default)]
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default)]
    pub binding_options: Map<String, Value>,
}

impl BindRequest {
    /// Bind to instance `service_id` with no options.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self { service_id: service_id.into(), ..Self::default() }
    }
}

/// A provisioned resource, as reported by the provisioner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: String,
    /// Opaque provisioner metadata, passed through untouched.
    #[serde(default)]
    pub gateway_data: Map<String, Value>,
    #[serde(default)]
    pub credentials: Map<String, Value>,
}

/// A consumer's binding to an instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub instance_id: String,
    pub binding_id: String,
    #[serde(default)]
    pub gateway_data: Map<String, Value>,
    #[serde(default)]
    pub credentials: Map<String, Value>,
}

/// Response body for create and bind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionResponse {
    /// Instance id (create) or binding id (bind).
    pub service_id: String,
    pub configuration: Map<String, Value>,
    pub credentials: Map<String, Value>,
}

impl From<ServiceInstance> for ProvisionResponse {
    fn from(instance: ServiceInstance) -> Self {
        let mut configuration = instance.gateway_data;
        configuration.insert(SERVICE_ID_KEY.into(), Value::String(instance.instance_id.clone()));
        Self {
            service_id: instance.instance_id,
            configuration,
            credentials: instance.credentials,
        }
    }
}

impl From<ServiceBinding> for ProvisionResponse {
    fn from(binding: ServiceBinding) -> Self {
        let mut configuration = binding.gateway_data;
        configuration.insert(SERVICE_ID_KEY.into(), Value::String(binding.instance_id));
        configuration.insert(BINDING_ID_KEY.into(), Value::String(binding.binding_id.clone()));
        Self { service_id: binding.binding_id, configuration, credentials: binding.credentials }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_ignores_unknown_fields() {
        let req: CreateRequest = serde_json::from_value(json!({
            "label": "db-1.0",
            "plan": "free",
            "space_guid": "s1",
            "provider": "core"
        }))
        .unwrap();
        assert_eq!(req.label, "db-1.0");
        assert_eq!(req.space_guid.as_deref(), Some("s1"));
    }

    #[test]
    fn instance_response_embeds_id_in_configuration() {
        let mut gateway_data = Map::new();
        gateway_data.insert("plan".into(), json!("free"));
        let response = ProvisionResponse::from(ServiceInstance {
            instance_id: "i-1".into(),
            gateway_data,
            credentials: Map::new(),
        });
        assert_eq!(response.service_id, "i-1");
        assert_eq!(Value::Object(response.configuration), json!({"plan": "free", "service_id": "i-1"}));
    }

    #[test]
    fn binding_response_uses_binding_id() {
        let response = ProvisionResponse::from(ServiceBinding {
            instance_id: "i-1".into(),
            binding_id: "b-1".into(),
            ..ServiceBinding::default()
        });
        assert_eq!(response.service_id, "b-1");
        assert_eq!(response.configuration["service_id"], "i-1");
        assert_eq!(response.configuration["binding_id"], "b-1");
    }
}
