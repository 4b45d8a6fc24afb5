//! Provisioning (service broker) protocol over HTTP.
//!
//! | Route | Method | Effect |
//! |---|---|---|
//! | `/gateway/v1/configurations` | `POST` | create an instance |
//! | `/gateway/v1/configurations/{id}` | `DELETE` | delete it |
//! | `/gateway/v1/configurations/{id}/handles` | `POST` | bind a consumer |
//! | `/gateway/v1/configurations/{id}/handles/{binding}` | `DELETE` | unbind |
//!
//! Every route requires the `X-VCAP-Service-Token` header. The broker holds no
//! state of its own; everything is delegated to a [`Provisioner`].

/// Provisioner capability and its in-memory implementation.
pub mod provisioner;
/// Request and response bodies.
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;

use crate::auth::{RequireAuth, ServiceTokenAuth};
use crate::config::BrokerConfig;
use crate::http::{
    route_fn, Captures, HandlerError, HttpRequest, HttpResponse, RequestFailure, Routes, ServerError,
};

pub use provisioner::{InMemoryProvisioner, Provisioner, ProvisionerError};
pub use types::{
    BindRequest, CreateRequest, ProvisionResponse, ServiceBinding, ServiceInstance, BINDING_ID_KEY,
    SERVICE_ID_KEY,
};

/// Instance collection route.
pub const CONFIGURATIONS_PATTERN: &str = "/gateway/v1/configurations(?:/([^/]+))?";
/// Binding sub-route. Must be registered before the collection route.
pub const HANDLES_PATTERN: &str = "/gateway/v1/configurations/([^/]+)/handles(?:/([^/]+))?";

/// Exposes a [`Provisioner`] through the broker routes.
#[derive(Clone)]
pub struct ServiceBroker {
    provisioner: Arc<dyn Provisioner>,
    auth: Arc<ServiceTokenAuth>,
}

impl ServiceBroker {
    /// Serve `provisioner`, guarded by the configured service token.
    pub fn new(config: BrokerConfig, provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner, auth: Arc::new(ServiceTokenAuth::new(config.service_token)) }
    }

    /// The wrapped provisioner.
    pub fn provisioner(&self) -> &Arc<dyn Provisioner> {
        &self.provisioner
    }

    /// Add the handles route, then the collection route, both behind the
    /// service-token check.
    pub fn register(&self, routes: &mut Routes) -> Result<(), ServerError> {
        let handles = self.clone();
        let configurations = self.clone();
        routes
            .add(
                HANDLES_PATTERN,
                RequireAuth::new(
                    self.auth.clone(),
                    route_fn(move |req, caps| {
                        let broker = handles.clone();
                        async move { broker.handle_bindings(req, caps).await }
                    }),
                ),
            )?
            .add(
                CONFIGURATIONS_PATTERN,
                RequireAuth::new(
                    self.auth.clone(),
                    route_fn(move |req, caps| {
                        let broker = configurations.clone();
                        async move { broker.handle_instances(req, caps).await }
                    }),
                ),
            )?;
        Ok(())
    }

    /// Create an instance and shape the create response.
    pub async fn provision(
        &self,
        request: CreateRequest,
    ) -> Result<ProvisionResponse, ProvisionerError> {
        let label = request.label.clone();
        let instance = self.provisioner.create(request).await?;
        info!(target: "switchboard::broker", label = %label, instance_id = %instance.instance_id, "provisioned");
        Ok(instance.into())
    }

    /// Delete an instance.
    pub async fn unprovision(&self, instance_id: &str) -> Result<(), ProvisionerError> {
        self.provisioner.delete(instance_id).await?;
        info!(target: "switchboard::broker", instance_id = %instance_id, "unprovisioned");
        Ok(())
    }

    /// Bind to `instance_id`; the path id wins over any id in the body.
    pub async fn bind(
        &self,
        instance_id: &str,
        mut request: BindRequest,
    ) -> Result<ProvisionResponse, ProvisionerError> {
        request.service_id = instance_id.to_string();
        let binding = self.provisioner.bind(request).await?;
        info!(target: "switchboard::broker", instance_id = %instance_id, binding_id = %binding.binding_id, "bound");
        Ok(binding.into())
    }

    /// Remove one binding of `instance_id`.
    pub async fn unbind(&self, instance_id: &str, binding_id: &str) -> Result<(), ProvisionerError> {
        self.provisioner.unbind(instance_id, binding_id).await?;
        info!(target: "switchboard::broker", instance_id = %instance_id, binding_id = %binding_id, "unbound");
        Ok(())
    }

    /// Remove every instance the provisioner holds that is not in `known`.
    /// Returns the removed ids.
    pub async fn reconcile(&self, known: &[String]) -> Result<Vec<String>, ProvisionerError> {
        let known: HashSet<&str> = known.iter().map(String::as_str).collect();
        let orphans: Vec<String> = self
            .provisioner
            .service_instance_ids()
            .await?
            .into_iter()
            .filter(|id| !known.contains(id.as_str()))
            .collect();
        if !orphans.is_empty() {
            self.provisioner.remove_orphaned_services(&orphans).await?;
            info!(target: "switchboard::broker", count = orphans.len(), "removed orphaned instances");
        }
        Ok(orphans)
    }

    /// Remove bindings of `instance_id` that are not in `known`.
    pub async fn reconcile_bindings(
        &self,
        instance_id: &str,
        known: &[String],
    ) -> Result<Vec<String>, ProvisionerError> {
        let known: HashSet<&str> = known.iter().map(String::as_str).collect();
        let orphans: Vec<String> = self
            .provisioner
            .binding_ids(instance_id)
            .await?
            .into_iter()
            .filter(|id| !known.contains(id.as_str()))
            .collect();
        if !orphans.is_empty() {
            self.provisioner.remove_orphaned_bindings(instance_id, &orphans).await?;
            info!(target: "switchboard::broker", instance_id = %instance_id, count = orphans.len(), "removed orphaned bindings");
        }
        Ok(orphans)
    }

    async fn handle_instances(
        &self,
        request: HttpRequest,
        captures: Captures,
    ) -> Result<HttpResponse, HandlerError> {
        match (request.method().clone(), captures.get(1)) {
            (Method::POST, None) => {
                let body: CreateRequest = decode_body(&request)?;
                let response = self.provision(body).await?;
                HttpResponse::json(StatusCode::OK, &response)
            }
            (Method::DELETE, Some(instance_id)) => {
                self.unprovision(instance_id).await?;
                HttpResponse::json(StatusCode::OK, &json!({}))
            }
            (Method::DELETE, None) => Err(RequestFailure::not_found().into()),
            (_, id) => Err(method_not_allowed(id.is_some()).into()),
        }
    }

    async fn handle_bindings(
        &self,
        request: HttpRequest,
        captures: Captures,
    ) -> Result<HttpResponse, HandlerError> {
        let instance_id = captures.get(1).ok_or_else(RequestFailure::not_found)?;
        match (request.method().clone(), captures.get(2)) {
            (Method::POST, None) => {
                let body: BindRequest = decode_body(&request)?;
                let response = self.bind(instance_id, body).await?;
                HttpResponse::json(StatusCode::OK, &response)
            }
            (Method::DELETE, Some(binding_id)) => {
                self.unbind(instance_id, binding_id).await?;
                HttpResponse::json(StatusCode::OK, &json!({}))
            }
            (Method::DELETE, None) => Err(RequestFailure::not_found().into()),
            (_, id) => Err(method_not_allowed(id.is_some()).into()),
        }
    }
}

impl std::fmt::Debug for ServiceBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBroker").field("auth", &self.auth).finish_non_exhaustive()
    }
}

/// A resource with a trailing id only supports `DELETE`; the collection only `POST`.
fn method_not_allowed(has_id: bool) -> RequestFailure {
    let allow = if has_id { "DELETE" } else { "POST" };
    RequestFailure::method_not_allowed().with_header(ALLOW, HeaderValue::from_static(allow))
}

fn decode_body<T: DeserializeOwned>(request: &HttpRequest) -> Result<T, RequestFailure> {
    serde_json::from_slice(request.body())
        .map_err(|e| RequestFailure::bad_request(format!("invalid request body: {e}")))
}
