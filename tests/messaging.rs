#![allow(missing_docs)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use switchboard::bus::{BusTransport, InMemoryBus};
use switchboard::messages::{
    ComponentDiscover, RouterGreet, RouterRegister, RouterRoute, RouterStart, ROUTER_REGISTER,
};
use switchboard::messaging::{
    handler_fn, MessageBus, Publication, PublicationHandler, SubscribeOptions,
};
use switchboard::{DecodeError, MessagingError};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn bus() -> MessageBus {
    common::test_helpers::init_tracing();
    MessageBus::new(InMemoryBus::new()).unwrap()
}

fn route() -> RouterRegister {
    RouterRegister(
        RouterRoute::new("10.0.0.5", 61001, ["app.example.com"]).with_app("app-guid").with_tag("component", "dea"),
    )
}

fn forward<T: switchboard::messaging::Message>(
    tx: mpsc::UnboundedSender<T>,
) -> impl PublicationHandler<T> {
    handler_fn(move |p: Publication<T>| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(p.into_body());
            Ok(())
        }
    })
}

async fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>, quiet: Duration) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(Some(v)) = timeout(quiet, rx.recv()).await {
        out.push(v);
    }
    out
}

#[tokio::test]
async fn published_message_round_trips_to_subscriber() {
    let bus = bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = bus.subscribe::<RouterRegister, _>(SubscribeOptions::new(), forward(tx)).await.unwrap();

    let sent = route();
    bus.publish(&sent).await.unwrap();

    let received = drain(&mut rx, Duration::from_millis(100)).await;
    assert_eq!(received, vec![sent]);
}

#[tokio::test]
async fn plain_subscribers_all_receive_every_message() {
    let bus = bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(
            bus.subscribe::<RouterRegister, _>(SubscribeOptions::new(), forward(tx.clone()))
                .await
                .unwrap(),
        );
    }

    for _ in 0..4 {
        bus.publish(&route()).await.unwrap();
    }
    assert_eq!(drain(&mut rx, Duration::from_millis(100)).await.len(), 12);
}

#[tokio::test]
async fn queue_group_members_share_deliveries() {
    let bus = bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(
            bus.subscribe::<RouterRegister, _>(
                SubscribeOptions::new().queue_group("routers"),
                forward(tx.clone()),
            )
            .await
            .unwrap(),
        );
    }

    for _ in 0..6 {
        bus.publish(&route()).await.unwrap();
    }
    assert_eq!(drain(&mut rx, Duration::from_millis(100)).await.len(), 6);
}

#[tokio::test]
async fn request_without_responder_times_out_promptly() {
    let bus = bus();
    let limit = Duration::from_millis(100);
    let start = Instant::now();
    let err = bus.request(&RouterGreet {}, limit).await.unwrap_err();
    assert!(err.is_timeout());
    let (_, reported_limit) = err.timeout_details().unwrap();
    assert_eq!(reported_limit, limit);
    assert!(start.elapsed() < limit + Duration::from_secs(1));
}

#[tokio::test]
async fn request_resolves_with_first_reply() {
    let bus = bus();
    let _router = bus
        .subscribe::<RouterGreet, _>(
            SubscribeOptions::new(),
            handler_fn(|p: Publication<RouterGreet>| async move {
                let start = RouterStart {
                    id: "router-1".into(),
                    hosts: vec!["10.0.0.9".into()],
                    minimum_register_interval_in_seconds: Some(20),
                };
                p.reply(&start).await
            }),
        )
        .await
        .unwrap();

    let start = bus.request(&RouterGreet {}, Duration::from_secs(1)).await.unwrap();
    assert_eq!(start.id, "router-1");
    assert_eq!(start.minimum_register_interval_in_seconds, Some(20));
}

#[tokio::test]
async fn request_takes_first_reply_and_ignores_later_ones() {
    let bus = bus();
    let mut subs = Vec::new();
    for (id, delay) in [("fast", 0u64), ("slow", 50)] {
        subs.push(
            bus.subscribe::<RouterGreet, _>(
                SubscribeOptions::new(),
                handler_fn(move |p: Publication<RouterGreet>| async move {
                    let start = RouterStart { id: id.into(), ..RouterStart::default() };
                    p.reply_after(&start, Duration::from_millis(delay))
                }),
            )
            .await
            .unwrap(),
        );
    }

    let start = bus.request(&RouterGreet {}, Duration::from_secs(1)).await.unwrap();
    assert_eq!(start.id, "fast");

    // The late reply lands on an inbox nobody listens to anymore.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let again = bus.request(&RouterGreet {}, Duration::from_secs(1)).await.unwrap();
    assert_eq!(again.id, "fast");
}

#[tokio::test]
async fn panicking_handler_does_not_stop_later_deliveries() {
    let bus = bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = bus
        .subscribe::<RouterRegister, _>(
            SubscribeOptions::new(),
            handler_fn(move |p: Publication<RouterRegister>| {
                let tx = tx.clone();
                async move {
                    if p.body().0.port == 1 {
                        panic!("handler blew up");
                    }
                    let _ = tx.send(p.into_body());
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();

    bus.publish(&RouterRegister(RouterRoute::new("10.0.0.5", 1, ["a.example.com"]))).await.unwrap();
    bus.publish(&RouterRegister(RouterRoute::new("10.0.0.5", 2, ["a.example.com"]))).await.unwrap();

    let delivered = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered.0.port, 2);
}

#[tokio::test]
async fn slow_handler_does_not_block_later_deliveries() {
    let bus = bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = bus
        .subscribe::<RouterRegister, _>(
            SubscribeOptions::new(),
            handler_fn(move |p: Publication<RouterRegister>| {
                let tx = tx.clone();
                async move {
                    if p.body().0.port == 1 {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                    let _ = tx.send(p.into_body());
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();

    bus.publish(&RouterRegister(RouterRoute::new("10.0.0.5", 1, ["a.example.com"]))).await.unwrap();
    bus.publish(&RouterRegister(RouterRoute::new("10.0.0.5", 2, ["a.example.com"]))).await.unwrap();

    let first = timeout(Duration::from_millis(500), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.0.port, 2);
}

#[tokio::test]
async fn request_all_collects_every_responder() {
    let bus = bus();
    let mut subs = Vec::new();
    for (i, delay) in [0u64, 20, 40].into_iter().enumerate() {
        subs.push(
            bus.subscribe::<RouterGreet, _>(
                SubscribeOptions::new(),
                handler_fn(move |p: Publication<RouterGreet>| async move {
                    let start = RouterStart { id: format!("r{i}"), ..RouterStart::default() };
                    p.reply_after(&start, Duration::from_millis(delay))
                }),
            )
            .await
            .unwrap(),
        );
    }

    let replies = bus.request_all(&RouterGreet {}, Duration::from_millis(300)).await.unwrap();
    let mut ids: Vec<String> = replies.into_iter().map(|r| r.unwrap().id).collect();
    ids.sort();
    assert_eq!(ids, vec!["r0", "r1", "r2"]);
}

#[tokio::test]
async fn reply_without_reply_subject_is_an_error() {
    let bus = bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = bus
        .subscribe::<ComponentDiscover, _>(
            SubscribeOptions::new(),
            handler_fn(move |p: Publication<ComponentDiscover>| {
                let tx = tx.clone();
                async move {
                    let result = p.reply(&dummy_announce()).await;
                    let _ = tx.send(result);
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();

    bus.publish(&ComponentDiscover {}).await.unwrap();
    let result = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(result, Err(MessagingError::NoReplySubject(_))));
}

fn dummy_announce() -> switchboard::messages::ComponentAnnounce {
    switchboard::messages::ComponentAnnounce {
        component_type: "T".into(),
        index: 0,
        uuid: "u".into(),
        host: "h:1".into(),
        credentials: ("a".into(), "b".into()),
        start: String::new(),
        uptime: String::new(),
    }
}

struct DecodeRecorder {
    good: mpsc::UnboundedSender<RouterRegister>,
    bad: mpsc::UnboundedSender<DecodeError>,
}

#[async_trait]
impl PublicationHandler<RouterRegister> for DecodeRecorder {
    async fn handle(&self, publication: Publication<RouterRegister>) -> Result<(), MessagingError> {
        let _ = self.good.send(publication.into_body());
        Ok(())
    }

    async fn on_decode_error(&self, error: &DecodeError) {
        let _ = self.bad.send(error.clone());
    }
}

#[tokio::test]
async fn decode_failures_reach_handler_and_do_not_stop_delivery() {
    let transport = Arc::new(InMemoryBus::new());
    let bus = MessageBus::with_registry(
        transport.clone(),
        switchboard::SubjectRegistry::builtin().unwrap(),
    );
    let (good_tx, mut good_rx) = mpsc::unbounded_channel();
    let (bad_tx, mut bad_rx) = mpsc::unbounded_channel();
    let _sub = bus
        .subscribe::<RouterRegister, _>(SubscribeOptions::new(), DecodeRecorder { good: good_tx, bad: bad_tx })
        .await
        .unwrap();

    transport.publish(ROUTER_REGISTER, Bytes::from_static(b"{not json"), None).await.unwrap();
    bus.publish(&route()).await.unwrap();

    let bad = timeout(Duration::from_secs(1), bad_rx.recv()).await.unwrap().unwrap();
    assert_eq!(bad.subject, ROUTER_REGISTER);
    let good = timeout(Duration::from_secs(1), good_rx.recv()).await.unwrap().unwrap();
    assert_eq!(good, route());
}

#[tokio::test]
async fn added_handlers_see_later_messages() {
    let bus = bus();
    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    let sub = bus.subscribe::<RouterRegister, _>(SubscribeOptions::new(), forward(first_tx)).await.unwrap();
    sub.add_handler(forward(second_tx));
    assert_eq!(sub.handler_count(), 2);

    bus.publish(&route()).await.unwrap();
    assert_eq!(drain(&mut first_rx, Duration::from_millis(100)).await.len(), 1);
    assert_eq!(drain(&mut second_rx, Duration::from_millis(100)).await.len(), 1);
}

#[tokio::test]
async fn closed_subscription_receives_nothing() {
    let transport = Arc::new(InMemoryBus::new());
    let bus = MessageBus::with_registry(transport.clone(), switchboard::SubjectRegistry::builtin().unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = bus.subscribe::<RouterRegister, _>(SubscribeOptions::new(), forward(tx)).await.unwrap();
    assert_eq!(transport.subscriber_count(), 1);

    sub.close().await.unwrap();
    assert_eq!(transport.subscriber_count(), 0);
    bus.publish(&route()).await.unwrap();
    assert!(drain(&mut rx, Duration::from_millis(100)).await.is_empty());
}

#[tokio::test]
async fn max_messages_is_passed_to_the_transport() {
    let bus = bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = bus
        .subscribe::<RouterRegister, _>(SubscribeOptions::new().max_messages(2), forward(tx))
        .await
        .unwrap();

    for _ in 0..5 {
        bus.publish(&route()).await.unwrap();
    }
    assert_eq!(drain(&mut rx, Duration::from_millis(100)).await.len(), 2);
}

#[tokio::test]
async fn publish_on_closed_bus_fails() {
    let transport = InMemoryBus::new();
    let bus = MessageBus::new(transport.clone()).unwrap();
    transport.close();
    let err = bus.publish(&route()).await.unwrap_err();
    assert!(matches!(err, MessagingError::Bus(switchboard::BusError::Closed)));
}
