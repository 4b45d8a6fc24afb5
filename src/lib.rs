#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # switchboard
//!
//! Control-plane substrate for distributed platform components: typed
//! messaging over a pub/sub bus, a small HTTP dispatcher, and the two
//! protocols built on them.
//!
//! ## Features
//!
//! - **Typed messaging** with a static subject registry, JSON bodies and
//!   request/reply with a first-class timeout
//! - **Bus transports** behind one trait (in-memory here, NATS in `switchboard-nats`)
//! - **HTTP dispatcher** with ordered regex routes and status mapping for
//!   handler failures and panics
//! - **Component heartbeat**: announce on discover, `/healthz` and `/varz`
//!   behind Basic auth
//! - **Service broker** routes delegating to a pluggable provisioner
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use switchboard::bus::InMemoryBus;
//! use switchboard::component::Component;
//! use switchboard::config::ComponentConfig;
//! use switchboard::http::{HttpServer, Routes};
//! use switchboard::messages::ComponentDiscover;
//! use switchboard::messaging::MessageBus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = MessageBus::new(InMemoryBus::new())?;
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//!     let mut routes = Routes::new();
//!     let component = Component::start(
//!         &bus,
//!         listener.local_addr()?,
//!         ComponentConfig::new("Demo"),
//!         &mut routes,
//!     )
//!     .await?;
//!     let server = HttpServer::from_listener(listener, routes)?;
//!
//!     let announce = bus.request(&ComponentDiscover {}, Duration::from_secs(1)).await?;
//!     assert_eq!(announce.uuid, component.identity().uuid());
//!
//!     component.close().await?;
//!     server.close().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broker;
pub mod bus;
pub mod component;
pub mod config;
pub mod error;
pub mod http;
pub mod messages;
pub mod messaging;
/// Convenient re-exports for common switchboard types.
pub mod prelude;

// Re-exports
pub use broker::{Provisioner, ProvisionerError, ServiceBroker};
pub use bus::{BusTransport, InMemoryBus};
pub use component::{Component, ComponentError, ComponentIdentity};
pub use config::{BrokerConfig, ComponentConfig};
pub use error::{BusError, DecodeError, MessagingError};
pub use crate::http::{HttpServer, Routes, ServerError};
pub use messaging::{MessageBus, SubjectRegistry};
