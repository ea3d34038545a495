#![allow(dead_code)]

use async_trait::async_trait;
use orderpay::application::Services;
use orderpay::domain::money::Currency;
use orderpay::domain::order::{
    AddressSnapshot, LineItem, Order, OrderStatus, Owner, PaymentStatus, Requester, StockRef,
};
use orderpay::domain::payment::{Payment, PaymentState};
use orderpay::domain::ports::{
    Decision, GatewayOrder, GatewayPayment, GatewayRef, GatewayRefund, Notifier, OrderStore,
    OrderStoreRef, PaymentGateway,
};
use orderpay::domain::webhook::GatewayEvent;
use orderpay::error::{PaymentError, Result};
use orderpay::infrastructure::in_memory::InMemoryOrderStore;
use orderpay::infrastructure::noop::NoopGateway;
use orderpay::infrastructure::signature;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const USER_ID: &str = "user_1";
pub const GUEST_EMAIL: &str = "guest@example.com";

#[derive(Default)]
pub struct CountingNotifier {
    sent: AtomicUsize,
}

impl CountingNotifier {
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send_order_confirmation(&self, _order: &Order) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub store: InMemoryOrderStore,
    pub services: Services,
    pub notifier: Arc<CountingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(Arc::new(noop_gateway()))
    }

    pub fn with_gateway(gateway: GatewayRef) -> Self {
        let store = InMemoryOrderStore::new();
        let notifier = Arc::new(CountingNotifier::default());
        let services = Services::new(Arc::new(store.clone()), gateway, notifier.clone());
        Self {
            store,
            services,
            notifier,
        }
    }

    /// Inserts a pending user order with stock rows for both its items.
    pub async fn with_pending_order(self, id: &str) -> Self {
        self.store.insert_order(user_order(id)).await.unwrap();
        self.store.set_stock(product(), 5).await.unwrap();
        self.store.set_stock(variant(), 3).await.unwrap();
        self
    }

    /// Creates the gateway order and returns its id.
    pub async fn start_payment(&self, order_id: &str) -> String {
        self.services
            .reconciler
            .create_payment_order(&user(), order_id)
            .await
            .unwrap()
            .gateway_order_id
    }

    /// Runs create and verify with a valid signature.
    pub async fn pay(&self, order_id: &str, gateway_payment_id: &str) -> String {
        let gateway_order_id = self.start_payment(order_id).await;
        self.services
            .reconciler
            .verify_payment(
                &user(),
                order_id,
                &gateway_order_id,
                gateway_payment_id,
                &payment_signature(&gateway_order_id, gateway_payment_id),
            )
            .await
            .unwrap();
        gateway_order_id
    }

    /// Marks the order paid outside the gateway (cash, bank transfer).
    pub async fn mark_paid_offline(&self, order_id: &str) {
        self.store
            .transact(
                order_id,
                Box::new(|uow| {
                    uow.order_mut().payment_status = PaymentStatus::Paid;
                    uow.order_mut().status = OrderStatus::Confirmed;
                    Ok(Decision::Commit)
                }),
            )
            .await
            .unwrap();
    }

    pub async fn order(&self, order_id: &str) -> Order {
        self.store.order(order_id).await.unwrap().unwrap()
    }

    pub async fn payment(&self, order_id: &str) -> Option<Payment> {
        self.store.payment(order_id).await.unwrap()
    }

    pub async fn notifications_sent(&self) -> usize {
        self.services.notifications.drain().await;
        self.notifier.sent()
    }
}

pub fn noop_gateway() -> NoopGateway {
    NoopGateway::with_secrets(KEY_SECRET, Some(WEBHOOK_SECRET.to_string()))
}

pub fn user() -> Requester {
    Requester::user(USER_ID)
}

pub fn product() -> StockRef {
    StockRef::Product("p1".into())
}

pub fn variant() -> StockRef {
    StockRef::Variant("v1".into())
}

pub fn inr() -> Currency {
    Currency::new("INR").unwrap()
}

pub fn user_order(id: &str) -> Order {
    order(
        id,
        Owner::User {
            user_id: USER_ID.into(),
        },
    )
}

pub fn guest_order(id: &str) -> Order {
    order(
        id,
        Owner::Guest {
            email: GUEST_EMAIL.into(),
            phone: Some("+919999999999".into()),
        },
    )
}

fn order(id: &str, owner: Owner) -> Order {
    Order {
        id: id.into(),
        order_number: format!("ORD-{id}"),
        owner,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        currency: inr(),
        subtotal: dec!(1999.00),
        shipping: dec!(0),
        tax: dec!(0),
        total: dec!(1999.00),
        gateway_order_id: None,
        gateway_payment_id: None,
        shipping_address: AddressSnapshot {
            name: "Asha Rao".into(),
            line1: "12 MG Road".into(),
            city: "Bengaluru".into(),
            postal_code: "560001".into(),
            country: "IN".into(),
            ..AddressSnapshot::default()
        },
        line_items: vec![
            LineItem {
                item: product(),
                quantity: 2,
                unit_price: dec!(666.00),
            },
            LineItem {
                item: variant(),
                quantity: 1,
                unit_price: dec!(667.00),
            },
        ],
        admin_notes: String::new(),
    }
}

/// Store behaviour shared by every `OrderStore`: after a retried payment
/// attempt only the latest gateway order id resolves to the order, and a
/// capture webhook for the abandoned attempt changes nothing.
pub async fn check_retry_forgets_previous_attempt(store: OrderStoreRef) {
    store.insert_order(user_order("ord_1")).await.unwrap();
    let services = Services::new(
        store.clone(),
        Arc::new(noop_gateway()),
        Arc::new(CountingNotifier::default()),
    );
    let first = services
        .reconciler
        .create_payment_order(&user(), "ord_1")
        .await
        .unwrap()
        .gateway_order_id;
    let second = services
        .reconciler
        .create_payment_order(&user(), "ord_1")
        .await
        .unwrap()
        .gateway_order_id;
    assert_ne!(first, second);

    assert!(store.order_by_gateway_order_id(&first).await.unwrap().is_none());
    let latest = store.order_by_gateway_order_id(&second).await.unwrap();
    assert_eq!(latest.unwrap().id, "ord_1");

    let body = payment_webhook("payment.captured", &first, "pay_1");
    let ack = services.webhooks.handle(&body, Some(&sign_webhook(&body))).await;
    assert!(ack.handled);
    let order = store.order("ord_1").await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.gateway_order_id.as_deref(), Some(second.as_str()));
}

/// A paid order whose line items hit `item` twice (2 then 3 units).
pub fn order_with_repeated_item(id: &str, item: StockRef) -> Order {
    let mut order = user_order(id);
    order.line_items = vec![
        LineItem {
            item: item.clone(),
            quantity: 2,
            unit_price: dec!(399.80),
        },
        LineItem {
            item,
            quantity: 3,
            unit_price: dec!(399.80),
        },
    ];
    order.payment_status = PaymentStatus::Paid;
    order.status = OrderStatus::Confirmed;
    order
}

pub fn payment_signature(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let message = signature::payment_message(gateway_order_id, gateway_payment_id);
    signature::sign(KEY_SECRET, message.as_bytes())
}

pub fn sign_webhook(body: &[u8]) -> String {
    signature::sign(WEBHOOK_SECRET, body)
}

pub fn payment_webhook(event: &str, gateway_order_id: &str, gateway_payment_id: &str) -> Vec<u8> {
    let (error_code, error_description) = if event == "payment.failed" {
        (Some("BAD_REQUEST_ERROR"), Some("Payment was declined"))
    } else {
        (None, None)
    };
    json!({
        "entity": "event",
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": gateway_payment_id,
                    "order_id": gateway_order_id,
                    "amount": 199900,
                    "currency": "INR",
                    "method": "upi",
                    "vpa": "asha@upi",
                    "error_code": error_code,
                    "error_description": error_description,
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn refund_webhook(
    event: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    refund_id: &str,
) -> Vec<u8> {
    json!({
        "entity": "event",
        "event": event,
        "payload": {
            "refund": {
                "entity": { "id": refund_id, "payment_id": gateway_payment_id, "amount": 199900 }
            },
            "payment": {
                "entity": { "id": gateway_payment_id, "order_id": gateway_order_id }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn captured_payment(order: &Order, gateway_payment_id: &str) -> Payment {
    let mut payment = Payment::created(
        &order.id,
        order.gateway_order_id.clone(),
        order.total,
        order.currency.clone(),
        chrono::Utc::now(),
    );
    payment.status = PaymentState::Captured;
    payment.gateway_payment_id = Some(gateway_payment_id.into());
    payment
}

/// Gateway whose network calls all fail. Signatures still verify locally.
pub struct RejectingGateway {
    inner: NoopGateway,
    pub calls: AtomicUsize,
}

impl RejectingGateway {
    pub fn new() -> Self {
        Self {
            inner: noop_gateway(),
            calls: AtomicUsize::new(0),
        }
    }

    fn reject<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PaymentError::Gateway(
            "The api key provided is invalid".to_string(),
        ))
    }
}

#[async_trait]
impl PaymentGateway for RejectingGateway {
    fn key_id(&self) -> &str {
        "rzp_test_rejecting"
    }

    fn webhook_enabled(&self) -> bool {
        self.inner.webhook_enabled()
    }

    async fn create_order(
        &self,
        _amount_minor: i64,
        _currency: &Currency,
        _receipt: &str,
        _notes: BTreeMap<String, String>,
    ) -> Result<GatewayOrder> {
        self.reject()
    }

    fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        self.inner
            .verify_payment_signature(gateway_order_id, gateway_payment_id, signature)
    }

    async fn capture_payment(
        &self,
        _gateway_payment_id: &str,
        _amount_minor: i64,
        _currency: &Currency,
    ) -> Result<GatewayPayment> {
        self.reject()
    }

    async fn refund_payment(
        &self,
        _gateway_payment_id: &str,
        _amount_minor: Option<i64>,
    ) -> Result<GatewayRefund> {
        self.reject()
    }

    async fn get_payment_details(&self, _gateway_payment_id: &str) -> Result<GatewayPayment> {
        self.reject()
    }

    fn verify_webhook_signature(
        &self,
        raw_payload: &[u8],
        signature: &str,
    ) -> Option<GatewayEvent> {
        self.inner.verify_webhook_signature(raw_payload, signature)
    }
}
