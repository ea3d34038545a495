use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{Decision, OrderStoreRef};
use crate::error::Result;
use tracing::info;

/// Admin-driven fulfilment transitions.
pub struct OrderStatusService {
    store: OrderStoreRef,
}

impl OrderStatusService {
    pub fn new(store: OrderStoreRef) -> Self {
        Self { store }
    }

    /// Moves the order to `to` if the transition table allows it. Checked
    /// against the stored status inside the transaction.
    pub async fn update_status(&self, order_id: &str, to: OrderStatus) -> Result<Order> {
        let outcome = self
            .store
            .transact(
                order_id,
                Box::new(move |uow| {
                    let next = uow.order().status.transition(to)?;
                    uow.order_mut().status = next;
                    Ok(Decision::Commit)
                }),
            )
            .await?;
        info!(order_id, status = %outcome.order.status, "order status updated");
        Ok(outcome.order)
    }
}
