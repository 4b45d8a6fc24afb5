//! Convenient re-exports for common switchboard types.
pub use crate::{
    auth::{AuthProvider, BasicAuth, RequireAuth, ServiceTokenAuth},
    broker::{
        BindRequest, CreateRequest, InMemoryProvisioner, ProvisionResponse, Provisioner,
        ProvisionerError, ServiceBinding, ServiceBroker, ServiceInstance,
    },
    bus::{BusTransport, InMemoryBus, RawMessage},
    component::{Component, ComponentIdentity, ProcessSampler, VarzProducer},
    config::{BrokerConfig, ComponentConfig},
    http::{
        route_fn, Captures, HandlerError, HttpRequest, HttpResponse, HttpServer, RequestFailure,
        RouteHandler, Routes,
    },
    messaging::{
        handler_fn, Message, MessageBus, NoReply, Publication, PublicationHandler,
        SubscribeOptions, Subscription,
    },
    BusError, DecodeError, MessagingError,
};
