use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use http::StatusCode;
use serde_json::{json, Map};

use super::types::{BindRequest, CreateRequest, ServiceBinding, ServiceInstance};
use crate::http::{HandlerError, RequestFailure};

/// Failure reported by a [`Provisioner`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProvisionerError {
    /// Answer the caller with this status.
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },
    /// Anything else; answered with `500`.
    #[error("provisioner failure: {0}")]
    Other(String),
}

impl ProvisionerError {
    /// Failure answered with `status`.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    /// `404` naming the missing resource.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::status(StatusCode::NOT_FOUND, format!("{what} not found"))
    }
}

impl From<ProvisionerError> for HandlerError {
    fn from(err: ProvisionerError) -> Self {
        match err {
            ProvisionerError::Status { status, message } => RequestFailure::new(status, message).into(),
            other => HandlerError::unexpected(other),
        }
    }
}

/// Owns the lifecycle of provisioned resources behind the broker routes.
///
/// Calls are never retried and never assumed idempotent by the broker.
#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    /// Provision a new instance.
    async fn create(&self, request: CreateRequest) -> Result<ServiceInstance, ProvisionerError>;

    /// Tear down an instance and its bindings.
    async fn delete(&self, instance_id: &str) -> Result<(), ProvisionerError>;

    /// Create a binding to `request.service_id`.
    async fn bind(&self, request: BindRequest) -> Result<ServiceBinding, ProvisionerError>;

    /// Remove one binding.
    async fn unbind(&self, instance_id: &str, binding_id: &str) -> Result<(), ProvisionerError>;

    /// Remove instances the platform no longer knows about.
    async fn remove_orphaned_services(&self, instance_ids: &[String]) -> Result<(), ProvisionerError>;

    /// Remove bindings of `instance_id` the platform no longer knows about.
    async fn remove_orphaned_bindings(
        &self,
        instance_id: &str,
        binding_ids: &[String],
    ) -> Result<(), ProvisionerError>;

    /// Every instance this provisioner currently holds.
    async fn service_instance_ids(&self) -> Result<Vec<String>, ProvisionerError>;

    /// Every binding of `instance_id`.
    async fn binding_ids(&self, instance_id: &str) -> Result<Vec<String>, ProvisionerError>;
}

#[derive(Debug)]
struct Provisioned {
    instance: ServiceInstance,
    bindings: BTreeMap<String, ServiceBinding>,
}

/// Process-local provisioner. Instances and bindings live in memory and get
/// random credentials.
#[derive(Debug, Default)]
pub struct InMemoryProvisioner {
    instances: Mutex<BTreeMap<String, Provisioned>>,
}

impl InMemoryProvisioner {
    /// Empty provisioner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no instance is live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Provisioned>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl Provisioner for InMemoryProvisioner {
    async fn create(&self, request: CreateRequest) -> Result<ServiceInstance, ProvisionerError> {
        let instance_id = new_id();
        let mut gateway_data = Map::new();
        gateway_data.insert("plan".into(), json!(request.plan));
        if let Some(version) = request.version {
            gateway_data.insert("version".into(), json!(version));
        }
        let mut credentials = Map::new();
        credentials.insert("name".into(), json!(instance_id));
        credentials.insert("label".into(), json!(request.label));
        let instance = ServiceInstance { instance_id: instance_id.clone(), gateway_data, credentials };
        self.lock()
            .insert(instance_id, Provisioned { instance: instance.clone(), bindings: BTreeMap::new() });
        Ok(instance)
    }

    async fn delete(&self, instance_id: &str) -> Result<(), ProvisionerError> {
        self.lock()
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| ProvisionerError::not_found(format!("instance {instance_id}")))
    }

    async fn bind(&self, request: BindRequest) -> Result<ServiceBinding, ProvisionerError> {
        let mut instances = self.lock();
        let provisioned = instances
            .get_mut(&request.service_id)
            .ok_or_else(|| ProvisionerError::not_found(format!("instance {}", request.service_id)))?;
        let binding_id = new_id();
        let mut credentials = provisioned.instance.credentials.clone();
        credentials.insert("user".into(), json!(binding_id));
        credentials.insert("password".into(), json!(new_id()));
        let binding = ServiceBinding {
            instance_id: request.service_id.clone(),
            binding_id: binding_id.clone(),
            gateway_data: request.binding_options,
            credentials,
        };
        provisioned.bindings.insert(binding_id, binding.clone());
        Ok(binding)
    }

    async fn unbind(&self, instance_id: &str, binding_id: &str) -> Result<(), ProvisionerError> {
        let mut instances = self.lock();
        let provisioned = instances
            .get_mut(instance_id)
            .ok_or_else(|| ProvisionerError::not_found(format!("instance {instance_id}")))?;
        provisioned
            .bindings
            .remove(binding_id)
            .map(|_| ())
            .ok_or_else(|| ProvisionerError::not_found(format!("binding {binding_id}")))
    }

    async fn remove_orphaned_services(&self, instance_ids: &[String]) -> Result<(), ProvisionerError> {
        let mut instances = self.lock();
        for id in instance_ids {
            instances.remove(id);
        }
        Ok(())
    }

    async fn remove_orphaned_bindings(
        &self,
        instance_id: &str,
        binding_ids: &[String],
    ) -> Result<(), ProvisionerError> {
        if let Some(provisioned) = self.lock().get_mut(instance_id) {
            for id in binding_ids {
                provisioned.bindings.remove(id);
            }
        }
        Ok(())
    }

    async fn service_instance_ids(&self) -> Result<Vec<String>, ProvisionerError> {
        Ok(self.lock().keys().cloned().collect())
    }

    async fn binding_ids(&self, instance_id: &str) -> Result<Vec<String>, ProvisionerError> {
        self.lock()
            .get(instance_id)
            .map(|p| p.bindings.keys().cloned().collect())
            .ok_or_else(|| ProvisionerError::not_found(format!("instance {instance_id}")))
    }
}
