//! Ready-to-use wiring recipes (“cookbook”) for switchboard.
//!
//! Each recipe binds a listener, builds the route table and starts the
//! protocols on it, returning the running pieces so callers can inspect and
//! close them.
//!
//! **Ladder:**
//! - Simple: [`serve_component`]
//! - Intermediate: [`serve_broker`]
//! - Observer side: [`discover_components`]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchboard::broker::{Provisioner, ServiceBroker};
use switchboard::component::{Component, ComponentError};
use switchboard::config::{BrokerConfig, ComponentConfig};
use switchboard::http::{HttpServer, Routes, ServerError};
use switchboard::messages::{ComponentAnnounce, ComponentDiscover};
use switchboard::messaging::MessageBus;
use switchboard::MessagingError;
use tokio::net::TcpListener;
use tracing::warn;

/// Failures while wiring a recipe.
#[derive(thiserror::Error, Debug)]
pub enum RecipeError {
    /// The listener could not be bound.
    #[error("bind failed: {0}")]
    Bind(#[from] std::io::Error),
    #[error(transparent)]
    Component(#[from] ComponentError),
    /// Route registration failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// A component with its HTTP endpoint.
#[derive(Debug)]
pub struct RunningComponent {
    pub component: Component,
    pub server: HttpServer,
}

impl RunningComponent {
    /// Stop answering discovery, then stop the listener.
    pub async fn shutdown(self) -> Result<(), MessagingError> {
        let closed = self.component.close().await;
        self.server.close().await;
        closed
    }
}

/// A broker that also announces itself as a component, sharing one listener.
#[derive(Debug)]
pub struct RunningBroker {
    pub component: Component,
    pub broker: ServiceBroker,
    pub server: HttpServer,
}

impl RunningBroker {
    /// Stop answering discovery, then stop the shared listener.
    pub async fn shutdown(self) -> Result<(), MessagingError> {
        let closed = self.component.close().await;
        self.server.close().await;
        closed
    }
}

/// Heartbeat only: `/healthz`, `/varz`, and announce-on-discover.
pub async fn serve_component(
    bus: &MessageBus,
    addr: SocketAddr,
    config: ComponentConfig,
) -> Result<RunningComponent, RecipeError> {
    let listener = TcpListener::bind(addr).await?;
    let mut routes = Routes::new();
    let component = Component::start(bus, listener.local_addr()?, config, &mut routes).await?;
    let server = HttpServer::from_listener(listener, routes)?;
    Ok(RunningComponent { component, server })
}

/// Broker routes plus the component protocol on the same listener.
pub async fn serve_broker(
    bus: &MessageBus,
    addr: SocketAddr,
    component: ComponentConfig,
    broker: BrokerConfig,
    provisioner: Arc<dyn Provisioner>,
) -> Result<RunningBroker, RecipeError> {
    let listener = TcpListener::bind(addr).await?;
    let mut routes = Routes::new();
    let broker = ServiceBroker::new(broker, provisioner);
    broker.register(&mut routes)?;
    let component = Component::start(bus, listener.local_addr()?, component, &mut routes).await?;
    let server = HttpServer::from_listener(listener, routes)?;
    Ok(RunningBroker { component, broker, server })
}

/// Ask every live component to announce itself and collect the answers that
/// arrive within `window`. Undecodable answers are logged and skipped.
pub async fn discover_components(
    bus: &MessageBus,
    window: Duration,
) -> Result<Vec<ComponentAnnounce>, MessagingError> {
    let replies = bus.request_all(&ComponentDiscover {}, window).await?;
    Ok(replies
        .into_iter()
        .filter_map(|reply| {
            reply
                .map_err(|e| {
                    warn!(target: "switchboard::component", subject = %e.subject, reason = %e.reason, "bad announce")
                })
                .ok()
        })
        .collect())
}
