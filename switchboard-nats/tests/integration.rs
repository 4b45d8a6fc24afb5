use std::time::Duration;

use switchboard::messages::{RouterGreet, RouterRegister, RouterRoute, RouterStart};
use switchboard::messaging::{handler_fn, MessageBus, Publication, SubscribeOptions};
use switchboard_nats::NatsTransport;

fn nats_url() -> String {
    std::env::var("SWITCHBOARD_TEST_NATS_URL").expect("set SWITCHBOARD_TEST_NATS_URL")
}

// Requires NATS running and env SWITCHBOARD_TEST_NATS_URL set, e.g. nats://127.0.0.1:4222
#[tokio::test]
#[ignore]
async fn request_reply_over_nats() {
    let responder = MessageBus::new(NatsTransport::connect(&nats_url()).await.unwrap()).unwrap();
    let requester = MessageBus::new(NatsTransport::connect(&nats_url()).await.unwrap()).unwrap();

    let _sub = responder
        .subscribe::<RouterGreet, _>(
            SubscribeOptions::new(),
            handler_fn(|p: Publication<RouterGreet>| async move {
                p.reply(&RouterStart { id: "nats-router".into(), ..RouterStart::default() }).await
            }),
        )
        .await
        .unwrap();
    // let the SUB reach the server before publishing
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = requester.request(&RouterGreet {}, Duration::from_secs(2)).await.unwrap();
    assert_eq!(start.id, "nats-router");
}

#[tokio::test]
#[ignore]
async fn max_messages_closes_subscription() {
    let transport = NatsTransport::connect(&nats_url()).await.unwrap();
    let bus = MessageBus::new(transport.clone()).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = bus
        .subscribe::<RouterRegister, _>(
            SubscribeOptions::new().max_messages(1),
            handler_fn(move |p: Publication<RouterRegister>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(p.into_body());
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    for _ in 0..3 {
        bus.publish(&RouterRegister(RouterRoute::new("10.0.0.1", 80, ["a.example.com"]))).await.unwrap();
    }
    transport.flush().await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert!(first.is_some());
    assert!(tokio::time::timeout(Duration::from_millis(300), rx.recv()).await.map_or(true, |m| m.is_none()));
}
