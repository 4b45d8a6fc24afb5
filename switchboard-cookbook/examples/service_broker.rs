use std::sync::Arc;

use switchboard::broker::{CreateRequest, InMemoryProvisioner};
use switchboard::bus::InMemoryBus;
use switchboard::config::{BrokerConfig, ComponentConfig};
use switchboard::messaging::MessageBus;
use switchboard_cookbook::serve_broker;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const TOKEN: &str = "demo-token";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bus = MessageBus::new(InMemoryBus::new())?;
    let running = serve_broker(
        &bus,
        "127.0.0.1:0".parse()?,
        ComponentConfig::new("DemoBroker"),
        BrokerConfig::new(TOKEN),
        Arc::new(InMemoryProvisioner::new()),
    )
    .await?;
    let addr = running.server.local_addr();

    // Create over HTTP, the way the cloud controller would.
    let body = serde_json::to_string(&CreateRequest::new("demo-db", "free"))?;
    let request = format!(
        "POST /gateway/v1/configurations HTTP/1.1\r\nHost: {addr}\r\nX-VCAP-Service-Token: {TOKEN}\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request.as_bytes()).await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    println!("{response}");

    // Orphan sweep: the platform knows about nothing, so everything goes.
    let removed = running.broker.reconcile(&[]).await?;
    println!("removed {} orphaned instance(s)", removed.len());

    running.shutdown().await?;
    Ok(())
}
