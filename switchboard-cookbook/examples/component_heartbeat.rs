use std::time::Duration;

use switchboard::bus::InMemoryBus;
use switchboard::config::ComponentConfig;
use switchboard::messaging::MessageBus;
use switchboard_cookbook::{discover_components, serve_component};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bus = MessageBus::new(InMemoryBus::new())?;
    let running =
        serve_component(&bus, "127.0.0.1:0".parse()?, ComponentConfig::new("HeartbeatDemo")).await?;
    let (user, pass) = running.component.identity().credentials();
    println!("varz at http://{user}:{pass}@{}/varz", running.server.local_addr());

    // Observer side: ask who is out there.
    for announce in discover_components(&bus, Duration::from_millis(250)).await? {
        println!("{} {} up {}", announce.component_type, announce.uuid, announce.uptime);
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    let again = discover_components(&bus, Duration::from_millis(250)).await?;
    if let Some(announce) = again.first() {
        println!("uptime now {}", announce.uptime);
    }

    running.shutdown().await?;
    Ok(())
}
