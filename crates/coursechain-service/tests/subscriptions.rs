mod common;

use std::time::Duration;

use common::{author, buyer, reader_for, service_for, FakeChain};
use coursechain_core::{CourseEvent, EventKind};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn next(rx: &mut mpsc::UnboundedReceiver<CourseEvent>) -> CourseEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within 5s")
        .expect("channel open")
}

#[tokio::test]
async fn stop_all_is_idempotent() {
    let chain = FakeChain::new();
    let svc = reader_for(&chain);

    assert_eq!(svc.stop_all_subscriptions().await, 0);
    assert_eq!(svc.stop_all_subscriptions().await, 0);

    svc.on_course_created(|_| {}).await.unwrap();
    svc.on_course_purchased(|_| {}).await.unwrap();
    assert_eq!(svc.subscription_count(), 2);

    assert_eq!(svc.stop_all_subscriptions().await, 2);
    assert_eq!(svc.stop_all_subscriptions().await, 0);
    assert_eq!(svc.subscription_count(), 0);
}

#[tokio::test]
async fn handlers_receive_live_events() {
    let chain = FakeChain::new();
    let watcher = reader_for(&chain);
    let seller = service_for(&chain, author());
    let student = service_for(&chain, buyer());

    let (created_tx, mut created_rx) = mpsc::unbounded_channel();
    let (bought_tx, mut bought_rx) = mpsc::unbounded_channel();
    watcher
        .on_course_created(move |ev| {
            let _ = created_tx.send(ev);
        })
        .await
        .unwrap();
    watcher
        .on_course_purchased(move |ev| {
            let _ = bought_tx.send(ev);
        })
        .await
        .unwrap();

    let id = seller.create_course("Intro", "desc", "0.1").await.course_id.unwrap();
    assert!(student.purchase_course(id, "0.1").await.success);

    let created = next(&mut created_rx).await;
    assert_eq!(created.kind, EventKind::Created);
    assert_eq!(created.course_id, id);
    assert_eq!(created.actor, author());
    assert_eq!(created.price.decimal, "0.1");

    let bought = next(&mut bought_rx).await;
    assert_eq!(bought.kind, EventKind::Purchased);
    assert_eq!(bought.actor, buyer());

    watcher.stop_all_subscriptions().await;
}

#[tokio::test]
async fn events_arrive_once_and_in_order() {
    let chain = FakeChain::new();
    let watcher = reader_for(&chain);
    let seller = service_for(&chain, author());

    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher
        .on_course_created(move |ev| {
            let _ = tx.send(ev.course_id);
        })
        .await
        .unwrap();

    for title in ["A", "B", "C"] {
        assert!(seller.create_course(title, "d", "1").await.success);
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(
            timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(seen, vec![1, 2, 3]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "no duplicate deliveries");
    watcher.stop_all_subscriptions().await;
}

#[tokio::test]
async fn unsubscribed_handler_stops_receiving() {
    let chain = FakeChain::new();
    let watcher = reader_for(&chain);
    let seller = service_for(&chain, author());

    let (kept_tx, mut kept_rx) = mpsc::unbounded_channel();
    let (gone_tx, mut gone_rx) = mpsc::unbounded_channel();
    watcher
        .on_course_created(move |ev| {
            let _ = kept_tx.send(ev.course_id);
        })
        .await
        .unwrap();
    let gone = watcher
        .on_course_created(move |ev| {
            let _ = gone_tx.send(ev.course_id);
        })
        .await
        .unwrap();

    assert!(watcher.unsubscribe(gone).await);
    assert!(!watcher.unsubscribe(gone).await);

    assert!(seller.create_course("A", "d", "1").await.success);
    assert_eq!(
        timeout(Duration::from_secs(5), kept_rx.recv()).await.unwrap(),
        Some(1)
    );
    assert_eq!(gone_rx.recv().await, None);
    watcher.stop_all_subscriptions().await;
}

#[tokio::test]
async fn subscribe_fails_when_node_is_down() {
    let chain = FakeChain::new();
    let watcher = reader_for(&chain);
    chain.set_offline(true);

    assert!(watcher.on_course_created(|_| {}).await.is_err());
    assert_eq!(watcher.subscription_count(), 0);
}
