mod common;

use std::sync::Arc;

use common::{author, buyer, ether, reader_for, service_for, FakeChain};
use coursechain_core::{ErrorKind, EventKind, TxState};

#[tokio::test]
async fn create_then_purchase_scenario() {
    let chain = FakeChain::new();
    let seller = service_for(&chain, author());
    let student = service_for(&chain, buyer());

    let created = seller.create_course("Intro", "desc", "0.1").await;
    assert!(created.success, "{:?}", created.error);
    assert_eq!(created.state, TxState::Confirmed);
    assert!(created.state.is_terminal());
    assert!(created.tx_hash.is_some());
    let id = created.course_id.expect("course id from CourseCreated");
    assert_eq!(id, 1);
    assert_eq!(created.events.len(), 1);
    assert_eq!(created.events[0].kind, EventKind::Created);
    assert_eq!(created.events[0].title.as_deref(), Some("Intro"));

    let course = seller.course(id).await.unwrap();
    assert_eq!(course.title, "Intro");
    assert_eq!(course.description, "desc");
    assert_eq!(course.author, author());
    assert_eq!(course.price.decimal, "0.1");

    assert!(!student.has_purchased(id, buyer()).await.unwrap());

    let purchased = student.purchase_course(id, "0.1").await;
    assert!(purchased.success, "{:?}", purchased.error);
    assert_eq!(purchased.course_id, Some(id));
    assert_eq!(purchased.events[0].kind, EventKind::Purchased);
    assert_eq!(purchased.events[0].actor, buyer());
    assert_eq!(purchased.events[0].price.decimal, "0.1");

    assert!(student.has_purchased(id, buyer()).await.unwrap());
    let buyers = seller.course_buyers(id).await.unwrap();
    assert_eq!(buyers.iter().filter(|b| **b == buyer()).count(), 1);
    assert_eq!(student.purchased_courses(buyer()).await.unwrap(), vec![id]);
}

#[tokio::test]
async fn ids_increase_with_each_create() {
    let chain = FakeChain::new();
    let svc = service_for(&chain, author());
    let mut last = 0;
    for title in ["A", "B", "C"] {
        let outcome = svc.create_course(title, "d", "1").await;
        let id = outcome.course_id.unwrap();
        assert!(id > last);
        last = id;
    }
    assert_eq!(svc.course_count().await.unwrap(), 3);
}

#[tokio::test]
async fn concurrent_creates_get_distinct_nonces() {
    let chain = FakeChain::new();
    let svc = Arc::new(service_for(&chain, author()));
    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.create_course(&format!("Course {i}"), "d", "0.5").await })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        ids.push(outcome.course_id.unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn underpayment_is_reverted_before_submission() {
    let chain = FakeChain::new();
    let seller = service_for(&chain, author());
    let student = service_for(&chain, buyer());
    let id = seller.create_course("Intro", "desc", "1").await.course_id.unwrap();

    let outcome = student.purchase_course(id, "0.5").await;
    assert!(!outcome.success);
    assert_eq!(outcome.state, TxState::Reverted);
    assert!(outcome.tx_hash.is_none());
    let err = outcome.error.unwrap();
    assert_eq!(err.kind, ErrorKind::Reverted);
    assert!(err.message.contains("Insufficient payment"), "{}", err.message);
    assert_eq!(chain.calls_to("eth_sendRawTransaction"), 1);
}

#[tokio::test]
async fn mined_revert_recovers_reason() {
    let chain = FakeChain::new();
    let seller = service_for(&chain, author());
    let student = service_for(&chain, buyer());
    let id = seller.create_course("Intro", "desc", "1").await.course_id.unwrap();

    chain.set_blind_estimates(true);
    let outcome = student.purchase_course(id, "0.5").await;
    assert!(!outcome.success);
    assert_eq!(outcome.state, TxState::Reverted);
    assert!(outcome.tx_hash.is_some());
    assert!(outcome.confirmation.is_some());
    let err = outcome.error.unwrap();
    assert_eq!(err.kind, ErrorKind::Reverted);
    assert!(err.message.contains("Insufficient payment"), "{}", err.message);
    assert!(!student.has_purchased(id, buyer()).await.unwrap());
}

#[tokio::test]
async fn invalid_amounts_never_reach_the_node() {
    let chain = FakeChain::new();
    let svc = service_for(&chain, author());

    for price in ["-1", "abc", "0.0000000000000000001", ""] {
        let outcome = svc.create_course("Intro", "desc", price).await;
        assert!(!outcome.success);
        assert_eq!(outcome.state, TxState::Building);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::InvalidArgument), "{price}");
    }
    let blank = svc.create_course("  ", "desc", "1").await;
    assert_eq!(blank.error_kind(), Some(ErrorKind::InvalidArgument));

    let bad_id = svc.purchase_course(0, "1").await;
    assert_eq!(bad_id.error_kind(), Some(ErrorKind::InvalidArgument));

    assert_eq!(chain.calls_to("eth_estimateGas"), 0);
    assert_eq!(chain.calls_to("eth_sendRawTransaction"), 0);
}

#[tokio::test]
async fn read_only_service_cannot_write() {
    let chain = FakeChain::new();
    let svc = reader_for(&chain);
    assert!(svc.signer_address().is_none());

    let outcome = svc.create_course("Intro", "desc", "1").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Signing));
    assert_eq!(outcome.state, TxState::Building);
}

#[tokio::test]
async fn network_failure_is_folded_into_outcome() {
    let chain = FakeChain::new();
    let svc = service_for(&chain, author());
    chain.set_offline(true);

    let outcome = svc.create_course("Intro", "desc", "1").await;
    assert!(!outcome.success);
    assert_eq!(outcome.state, TxState::NetworkFailure);
    assert_eq!(outcome.error_kind(), Some(ErrorKind::NetworkFailure));

    chain.set_offline(false);
    assert!(svc.create_course("Intro", "desc", "1").await.success);
}

#[tokio::test]
async fn refused_submission_is_rejected() {
    let chain = FakeChain::new();
    let svc = service_for(&chain, author());
    chain.fail_method(
        "eth_sendRawTransaction",
        -32000,
        "insufficient funds for gas * price + value",
    );

    let outcome = svc.create_course("Intro", "desc", "1").await;
    assert!(!outcome.success);
    assert!(outcome.tx_hash.is_none());
    assert_eq!(outcome.state, TxState::NetworkFailure);
    let err = outcome.error.unwrap();
    assert_eq!(err.kind, ErrorKind::Rejected);
    assert!(err.message.contains("insufficient funds"), "{}", err.message);
}

#[tokio::test]
async fn duplicate_purchase_is_reverted() {
    let chain = FakeChain::new();
    let seller = service_for(&chain, author());
    let student = service_for(&chain, buyer());
    let id = seller.create_course("Intro", "desc", "0.1").await.course_id.unwrap();

    assert!(student.purchase_course(id, "0.1").await.success);
    let again = student.purchase_course(id, "0.1").await;
    assert_eq!(again.error_kind(), Some(ErrorKind::Reverted));
    assert_eq!(seller.course_buyers(id).await.unwrap(), vec![buyer()]);
}

#[tokio::test]
async fn payment_moves_to_author() {
    let chain = FakeChain::new();
    let seller = service_for(&chain, author());
    let student = service_for(&chain, buyer());
    let id = seller.create_course("Intro", "desc", "2").await.course_id.unwrap();
    assert!(student.purchase_course(id, "2").await.success);

    let seller_balance = seller.balance(None).await.unwrap();
    assert_eq!(seller_balance.account, author());
    assert_eq!(seller_balance.amount.smallest_unit, ether(102));
    assert_eq!(seller_balance.amount.decimal, "102");

    let buyer_balance = seller.balance(Some(buyer())).await.unwrap();
    assert_eq!(buyer_balance.amount.decimal, "98");
}
