//! Application layer orchestrating the payment lifecycle.
//!
//! Every state change goes through [`OrderStore::transact`](crate::domain::ports::OrderStore::transact),
//! so the reconciler, the webhook verifier and the refund processor can race
//! on the same order without double-applying a transition.

pub mod order_status;
pub mod reconciler;
pub mod refund;
mod transitions;
pub mod webhook;

use crate::domain::ports::{GatewayRef, NotifierRef, OrderStoreRef};
use crate::infrastructure::notify::Notifications;
use order_status::OrderStatusService;
use reconciler::Reconciler;
use refund::RefundProcessor;
use std::sync::Arc;
use webhook::WebhookVerifier;

/// All services wired against one store, gateway and notifier.
#[derive(Clone)]
pub struct Services {
    pub reconciler: Arc<Reconciler>,
    pub webhooks: Arc<WebhookVerifier>,
    pub refunds: Arc<RefundProcessor>,
    pub statuses: Arc<OrderStatusService>,
    pub notifications: Notifications,
}

impl Services {
    pub fn new(store: OrderStoreRef, gateway: GatewayRef, notifier: NotifierRef) -> Self {
        let notifications = Notifications::new(notifier);
        Self {
            reconciler: Arc::new(Reconciler::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                notifications.clone(),
            )),
            webhooks: Arc::new(WebhookVerifier::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                notifications.clone(),
            )),
            refunds: Arc::new(RefundProcessor::new(Arc::clone(&store), gateway)),
            statuses: Arc::new(OrderStatusService::new(store)),
            notifications,
        }
    }
}
