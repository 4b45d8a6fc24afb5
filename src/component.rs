//! Component identity and heartbeat protocol.
//!
//! A started [`Component`] answers every `vcap.component.discover` request with
//! a fresh [`ComponentAnnounce`](crate::messages::ComponentAnnounce), announces
//! itself once at startup, and serves `/healthz` and `/varz` behind HTTP Basic
//! auth using its generated credentials.

/// Process-lifetime identity.
pub mod identity;
/// `/varz` document, producers and process sampling.
pub mod varz;

use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::{BasicAuth, RequireAuth};
use crate::config::ComponentConfig;
use crate::error::MessagingError;
use crate::http::{route_fn, HttpResponse, Routes, ServerError};
use crate::messages::ComponentDiscover;
use crate::messaging::{handler_fn, MessageBus, Publication, SubscribeOptions, Subscription};

pub use identity::{format_uptime, ComponentIdentity};
pub use varz::{ProcessSample, ProcessSampler, PsSampler, VarzProducer};

/// Health route pattern.
pub const HEALTHZ_PATH: &str = "/healthz";
/// Metrics route pattern.
pub const VARZ_PATH: &str = "/varz";

/// Failures while starting a component.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ComponentError {
    /// Subscribing to discovery failed.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    /// Registering the identity routes failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Builder for a [`Component`].
pub struct ComponentBuilder {
    config: ComponentConfig,
    producers: Vec<Arc<dyn VarzProducer>>,
    sampler: Arc<dyn ProcessSampler>,
}

impl ComponentBuilder {
    /// Add a `/varz` contributor. Later producers override earlier keys.
    pub fn varz_producer<P: VarzProducer + 'static>(mut self, producer: P) -> Self {
        self.producers.push(Arc::new(producer));
        self
    }

    /// Replace the default `ps`-based sampler.
    pub fn sampler<S: ProcessSampler + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Arc::new(sampler);
        self
    }

    /// Generate the identity, register `/healthz` and `/varz` on `routes`,
    /// subscribe to discovery, and publish one announce.
    ///
    /// `server_addr` is advertised unless the config names a host.
    pub async fn start(
        self,
        bus: &MessageBus,
        server_addr: SocketAddr,
        routes: &mut Routes,
    ) -> Result<Component, ComponentError> {
        let host = self.config.host.clone().unwrap_or_else(|| server_addr.to_string());
        let identity = Arc::new(ComponentIdentity::generate(&self.config.component_type, host));
        let (username, password) = identity.credentials();
        let auth = Arc::new(BasicAuth::new(username, password, &self.config.realm));

        routes
            .add(
                HEALTHZ_PATH,
                RequireAuth::new(
                    auth.clone(),
                    route_fn(|_req, _caps| async { Ok(HttpResponse::text(StatusCode::OK, "ok\n")) }),
                ),
            )?
            .add(VARZ_PATH, RequireAuth::new(auth, varz_route(identity.clone(), self.producers, self.sampler)))?;

        let responder = identity.clone();
        let discover = bus
            .subscribe::<ComponentDiscover, _>(
                SubscribeOptions::new(),
                handler_fn(move |publication: Publication<ComponentDiscover>| {
                    let identity = responder.clone();
                    async move {
                        if publication.reply_to().is_none() {
                            debug!(target: "switchboard::component", "discover without reply subject");
                            return Ok(());
                        }
                        publication.reply(&identity.announce()).await
                    }
                }),
            )
            .await?;

        bus.publish(&identity.announce()).await?;
        info!(
            target: "switchboard::component",
            component_type = %identity.component_type(),
            uuid = %identity.uuid(),
            host = %identity.host(),
            "component announced"
        );

        Ok(Component { identity, discover: Some(discover) })
    }
}

fn varz_route(
    identity: Arc<ComponentIdentity>,
    producers: Vec<Arc<dyn VarzProducer>>,
    sampler: Arc<dyn ProcessSampler>,
) -> impl crate::http::RouteHandler {
    let producers: Arc<[Arc<dyn VarzProducer>]> = producers.into();
    route_fn(move |_req, _caps| {
        let identity = identity.clone();
        let producers = producers.clone();
        let sampler = sampler.clone();
        async move {
            let sample = sampler.sample().await;
            let doc = varz::snapshot(&identity, sample, &producers);
            HttpResponse::json_pretty(StatusCode::OK, &Value::Object(doc))
        }
    })
}

/// A running component: its identity plus the discover subscription.
pub struct Component {
    identity: Arc<ComponentIdentity>,
    discover: Option<Subscription<ComponentDiscover>>,
}

impl Component {
    /// Start building a component from `config`.
    pub fn builder(config: ComponentConfig) -> ComponentBuilder {
        ComponentBuilder { config, producers: Vec::new(), sampler: Arc::new(PsSampler) }
    }

    /// Start with no extra `/varz` producers and the default sampler.
    pub async fn start(
        bus: &MessageBus,
        server_addr: SocketAddr,
        config: ComponentConfig,
        routes: &mut Routes,
    ) -> Result<Self, ComponentError> {
        Self::builder(config).start(bus, server_addr, routes).await
    }

    /// Identity advertised in announces.
    pub fn identity(&self) -> &ComponentIdentity {
        &self.identity
    }

    /// Stop answering discovery requests.
    pub async fn close(mut self) -> Result<(), MessagingError> {
        match self.discover.take() {
            Some(sub) => sub.close().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component").field("identity", &self.identity).finish_non_exhaustive()
    }
}
