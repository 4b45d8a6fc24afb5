use std::sync::Arc;
use std::time::Duration;

use switchboard::broker::InMemoryProvisioner;
use switchboard::bus::InMemoryBus;
use switchboard::config::{BrokerConfig, ComponentConfig};
use switchboard::messaging::MessageBus;
use switchboard_cookbook::{discover_components, serve_broker, serve_component};

#[tokio::test]
async fn discovery_finds_every_running_component() {
    let bus = MessageBus::new(InMemoryBus::new()).unwrap();
    let addr = "127.0.0.1:0".parse().unwrap();

    let cache = serve_component(&bus, addr, ComponentConfig::new("Cache")).await.unwrap();
    let broker = serve_broker(
        &bus,
        addr,
        ComponentConfig::new("ServiceBroker"),
        BrokerConfig::new("secret"),
        Arc::new(InMemoryProvisioner::new()),
    )
    .await
    .unwrap();

    let mut kinds: Vec<String> = discover_components(&bus, Duration::from_millis(300))
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.component_type)
        .collect();
    kinds.sort();
    assert_eq!(kinds, vec!["Cache", "ServiceBroker"]);
    assert_ne!(cache.server.local_addr(), broker.server.local_addr());

    cache.shutdown().await.unwrap();
    broker.shutdown().await.unwrap();
}
