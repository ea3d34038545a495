mod common;

use common::*;
use orderpay::domain::order::{OrderStatus, PaymentStatus, Requester};
use orderpay::domain::payment::PaymentState;
use orderpay::domain::ports::{Decision, OrderStore};
use orderpay::error::PaymentError;
use orderpay::infrastructure::in_memory::InMemoryOrderStore;
use std::sync::Arc;

#[tokio::test]
async fn test_create_payment_order_converts_amount_and_records_attempt() {
    let h = Harness::new().with_pending_order("ord_1").await;

    let info = h
        .services
        .reconciler
        .create_payment_order(&user(), "ord_1")
        .await
        .unwrap();

    assert_eq!(info.amount, 199900);
    assert_eq!(info.key_id, "noop");
    assert_eq!(info.order_number, "ORD-ord_1");
    assert_eq!(info.prefill.name.as_deref(), Some("Asha Rao"));
    assert!(info.gateway_order_id.starts_with("order_noop_"));

    let order = h.order("ord_1").await;
    assert_eq!(order.gateway_order_id.as_deref(), Some(info.gateway_order_id.as_str()));
    let payment = h.payment("ord_1").await.unwrap();
    assert_eq!(payment.status, PaymentState::Created);
    assert_eq!(payment.gateway_order_id, order.gateway_order_id);
}

#[tokio::test]
async fn test_retry_replaces_previous_attempt() {
    let h = Harness::new().with_pending_order("ord_1").await;

    let first = h.start_payment("ord_1").await;
    let second = h.start_payment("ord_1").await;

    assert_ne!(first, second);
    assert_eq!(h.order("ord_1").await.gateway_order_id.as_deref(), Some(second.as_str()));
    assert_eq!(
        h.payment("ord_1").await.unwrap().gateway_order_id.as_deref(),
        Some(second.as_str())
    );
}

#[tokio::test]
async fn test_foreign_and_missing_orders_are_indistinguishable() {
    let h = Harness::new().with_pending_order("ord_1").await;
    let reconciler = &h.services.reconciler;

    let foreign = reconciler
        .create_payment_order(&Requester::user("someone_else"), "ord_1")
        .await;
    let missing = reconciler.create_payment_order(&user(), "ord_404").await;

    match (foreign, missing) {
        (Err(PaymentError::NotFound(a)), Err(PaymentError::NotFound(b))) => {
            assert_eq!(a, "order ord_1");
            assert_eq!(b, "order ord_404");
        }
        other => panic!("expected NotFound twice, got {other:?}"),
    }
}

#[tokio::test]
async fn test_guest_checkout_matches_email_case_insensitively() {
    let h = Harness::new();
    h.store.insert_order(guest_order("ord_g")).await.unwrap();

    let info = h
        .services
        .reconciler
        .create_payment_order(&Requester::guest("  GUEST@example.com"), "ord_g")
        .await
        .unwrap();
    assert_eq!(info.prefill.contact.as_deref(), Some("+919999999999"));

    let denied = h
        .services
        .reconciler
        .create_payment_order(&Requester::guest("other@example.com"), "ord_g")
        .await;
    assert!(matches!(denied, Err(PaymentError::NotFound(_))));
}

#[tokio::test]
async fn test_non_pending_order_is_rejected() {
    let h = Harness::new().with_pending_order("ord_1").await;
    h.services
        .statuses
        .update_status("ord_1", OrderStatus::Cancelled)
        .await
        .unwrap();

    let err = h
        .services
        .reconciler
        .create_payment_order(&user(), "ord_1")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::BadRequest(ref m) if m.contains("cancelled")));
}

#[tokio::test]
async fn test_captured_payment_blocks_new_attempt() {
    let h = Harness::new().with_pending_order("ord_1").await;
    h.store
        .transact(
            "ord_1",
            Box::new(|uow| {
                let payment = captured_payment(uow.order(), "pay_earlier");
                uow.upsert_payment(payment);
                Ok(Decision::Commit)
            }),
        )
        .await
        .unwrap();

    let err = h
        .services
        .reconciler
        .create_payment_order(&user(), "ord_1")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::BadRequest(ref m) if m == "already paid"));
}

#[tokio::test]
async fn test_gateway_failure_leaves_no_trace() {
    let h = Harness::with_gateway(Arc::new(RejectingGateway::new()))
        .with_pending_order("ord_1")
        .await;

    let err = h
        .services
        .reconciler
        .create_payment_order(&user(), "ord_1")
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Gateway(_)));
    assert!(h.payment("ord_1").await.is_none());
    assert!(h.order("ord_1").await.gateway_order_id.is_none());
}

#[tokio::test]
async fn test_verify_captures_once_and_notifies_once() {
    let h = Harness::new().with_pending_order("ord_1").await;
    let gateway_order_id = h.start_payment("ord_1").await;
    let signature = payment_signature(&gateway_order_id, "pay_1");

    let first = h
        .services
        .reconciler
        .verify_payment(&user(), "ord_1", &gateway_order_id, "pay_1", &signature)
        .await
        .unwrap();
    assert!(!first.already_processed);
    assert_eq!(first.payment_status, PaymentStatus::Paid);
    assert_eq!(first.status, OrderStatus::Confirmed);

    let second = h
        .services
        .reconciler
        .verify_payment(&user(), "ord_1", &gateway_order_id, "pay_1", &signature)
        .await
        .unwrap();
    assert!(second.already_processed);

    let payment = h.payment("ord_1").await.unwrap();
    assert_eq!(payment.status, PaymentState::Captured);
    assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_1"));
    assert_eq!(payment.signature.as_deref(), Some(signature.as_str()));
    assert!(payment.paid_at.is_some());
    assert_eq!(h.order("ord_1").await.gateway_payment_id.as_deref(), Some("pay_1"));
    assert_eq!(h.notifications_sent().await, 1);
}

#[tokio::test]
async fn test_verify_with_bad_signature_marks_failure() {
    let h = Harness::new().with_pending_order("ord_1").await;
    let gateway_order_id = h.start_payment("ord_1").await;

    let err = h
        .services
        .reconciler
        .verify_payment(&user(), "ord_1", &gateway_order_id, "pay_1", "deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::BadRequest(ref m) if m == "verification failed"));

    let payment = h.payment("ord_1").await.unwrap();
    assert_eq!(payment.status, PaymentState::Failed);
    assert_eq!(payment.error_code.as_deref(), Some("invalid_signature"));
    assert!(payment.failed_at.is_some());
    assert_eq!(h.order("ord_1").await.payment_status, PaymentStatus::Failed);
    assert_eq!(h.notifications_sent().await, 0);
}

#[tokio::test]
async fn test_forged_verify_cannot_undo_capture() {
    let h = Harness::new().with_pending_order("ord_1").await;
    let gateway_order_id = h.pay("ord_1", "pay_1").await;

    let err = h
        .services
        .reconciler
        .verify_payment(&user(), "ord_1", &gateway_order_id, "pay_1", "forged")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::BadRequest(_)));

    assert_eq!(h.order("ord_1").await.payment_status, PaymentStatus::Paid);
    assert_eq!(h.payment("ord_1").await.unwrap().status, PaymentState::Captured);
}

#[tokio::test]
async fn test_verify_rejects_stale_gateway_order() {
    let h = Harness::new().with_pending_order("ord_1").await;
    let stale = h.start_payment("ord_1").await;
    h.start_payment("ord_1").await;

    let err = h
        .services
        .reconciler
        .verify_payment(
            &user(),
            "ord_1",
            &stale,
            "pay_1",
            &payment_signature(&stale, "pay_1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::BadRequest(ref m) if m == "invalid gateway order id"));
    assert_eq!(h.order("ord_1").await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_verify_survives_unavailable_payment_details() {
    // create_order would fail on this gateway, so set up the attempt by hand
    let h = Harness::with_gateway(Arc::new(RejectingGateway::new()))
        .with_pending_order("ord_1")
        .await;
    h.store
        .transact(
            "ord_1",
            Box::new(|uow| {
                uow.order_mut().gateway_order_id = Some("order_manual".into());
                Ok(Decision::Commit)
            }),
        )
        .await
        .unwrap();

    let result = h
        .services
        .reconciler
        .verify_payment(
            &user(),
            "ord_1",
            "order_manual",
            "pay_1",
            &payment_signature("order_manual", "pay_1"),
        )
        .await
        .unwrap();

    assert_eq!(result.payment_status, PaymentStatus::Paid);
    assert_eq!(h.payment("ord_1").await.unwrap().details.method, None);
}

#[tokio::test]
async fn test_payment_status_view() {
    let h = Harness::new().with_pending_order("ord_1").await;
    let before = h
        .services
        .reconciler
        .payment_status(&user(), "ord_1")
        .await
        .unwrap();
    assert!(before.payment.is_none());

    h.pay("ord_1", "pay_1").await;
    let after = h
        .services
        .reconciler
        .payment_status(&user(), "ord_1")
        .await
        .unwrap();
    assert_eq!(after.payment_status, PaymentStatus::Paid);
    assert_eq!(after.payment.unwrap().status, PaymentState::Captured);

    let foreign = h
        .services
        .reconciler
        .payment_status(&Requester::user("intruder"), "ord_1")
        .await;
    assert!(matches!(foreign, Err(PaymentError::NotFound(_))));
}

#[tokio::test]
async fn test_retry_forgets_previous_gateway_order() {
    check_retry_forgets_previous_attempt(Arc::new(InMemoryOrderStore::new())).await;
}
