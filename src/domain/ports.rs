use super::money::Currency;
use super::order::{Order, StockRef};
use super::payment::{Payment, PaymentMethodDetails};
use super::webhook::GatewayEvent;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A provider-side order created before the payer completes payment.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub amount_minor: i64,
    pub details: PaymentMethodDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount_minor: i64,
    pub status: String,
}

/// Uniform interface over one payment provider's API.
///
/// Amounts are always in the provider's smallest currency unit.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key identifier handed to the client-side payment widget.
    fn key_id(&self) -> &str;

    /// Whether a webhook secret is configured at all.
    fn webhook_enabled(&self) -> bool;

    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &Currency,
        receipt: &str,
        notes: BTreeMap<String, String>,
    ) -> Result<GatewayOrder>;

    /// HMAC-SHA256 over `"{gateway_order_id}|{gateway_payment_id}"`.
    fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool;

    async fn capture_payment(
        &self,
        gateway_payment_id: &str,
        amount_minor: i64,
        currency: &Currency,
    ) -> Result<GatewayPayment>;

    /// Refunds `amount_minor`, or the full captured amount when `None`.
    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<GatewayRefund>;

    async fn get_payment_details(&self, gateway_payment_id: &str) -> Result<GatewayPayment>;

    /// Checks the signature over the untouched body and only then decodes it.
    /// Returns `None` for a bad signature or an undecodable payload.
    fn verify_webhook_signature(&self, raw_payload: &[u8], signature: &str)
    -> Option<GatewayEvent>;
}

/// Outbound customer notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()>;
}

/// What a unit of work decided after inspecting current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Commit,
    Skip,
}

/// Working copy of one order, its payment row and pending stock increments.
///
/// Increments are summed per stock item, so a store applies exactly one
/// `current + total` per item. Nothing here touches the store. The store applies the whole copy at once
/// when the work returns [`Decision::Commit`].
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    order: Order,
    payment: Option<Payment>,
    restock: BTreeMap<StockRef, i64>,
}

impl UnitOfWork {
    pub fn new(order: Order, payment: Option<Payment>) -> Self {
        Self {
            order,
            payment,
            restock: BTreeMap::new(),
        }
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn order_mut(&mut self) -> &mut Order {
        &mut self.order
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn payment_mut(&mut self) -> Option<&mut Payment> {
        self.payment.as_mut()
    }

    /// Overwrites the order's payment row.
    pub fn upsert_payment(&mut self, payment: Payment) {
        self.payment = Some(payment);
    }

    /// Returns the payment row, creating it from `init` if the order has none.
    pub fn payment_or_insert_with(&mut self, init: impl FnOnce(&Order) -> Payment) -> &mut Payment {
        let order = &self.order;
        self.payment.get_or_insert_with(|| init(order))
    }

    pub fn restock(&mut self, item: StockRef, quantity: u32) {
        *self.restock.entry(item).or_default() += i64::from(quantity);
    }

    /// Pending increment for `item`, summed over every `restock` call.
    pub fn pending_restock(&self, item: &StockRef) -> i64 {
        self.restock.get(item).copied().unwrap_or_default()
    }

    pub fn into_parts(self) -> (Order, Option<Payment>, BTreeMap<StockRef, i64>) {
        (self.order, self.payment, self.restock)
    }
}

pub type Work = Box<dyn FnOnce(&mut UnitOfWork) -> Result<Decision> + Send>;

/// Result of [`OrderStore::transact`]: the state after the call.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub applied: bool,
    pub order: Order,
    pub payment: Option<Payment>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a checked-out order. Used by checkout and seeding.
    async fn insert_order(&self, order: Order) -> Result<()>;
    async fn order(&self, order_id: &str) -> Result<Option<Order>>;
    async fn order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>>;
    async fn order_by_gateway_payment_id(&self, gateway_payment_id: &str)
    -> Result<Option<Order>>;
    async fn payment(&self, order_id: &str) -> Result<Option<Payment>>;
    async fn stock(&self, item: &StockRef) -> Result<Option<i64>>;
    async fn set_stock(&self, item: StockRef, quantity: i64) -> Result<()>;

    /// Runs `work` against the current order and payment, serialized with
    /// every other transaction. Commit writes order, payment and restocks
    /// atomically; `Skip` or an error leaves the store untouched.
    async fn transact(&self, order_id: &str, work: Work) -> Result<TxOutcome>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
pub type NotifierRef = Arc<dyn Notifier>;
