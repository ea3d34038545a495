use crate::domain::order::{Order, StockRef};
use crate::domain::payment::Payment;
use crate::domain::ports::{Decision, OrderStore, TxOutcome, UnitOfWork, Work};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::warn;

/// Point in a commit at which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    /// After order and payment are staged, before any stock is staged.
    BeforeRestock,
}

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    payments: HashMap<String, Payment>,
    stock: HashMap<StockRef, i64>,
}

/// A thread-safe in-memory order store.
///
/// All tables sit behind one `RwLock`, so a transaction holds the write lock
/// from its first read to its last write. Commits are staged into local
/// values and swapped in at the end; a failure before the swap leaves the
/// tables exactly as they were.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
    fault: Arc<Mutex<Option<CommitStage>>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail at `stage`. Used to prove atomicity.
    pub fn fail_commit_at(&self, stage: CommitStage) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = Some(stage);
        }
    }

    fn take_fault(&self, stage: CommitStage) -> bool {
        match self.fault.lock() {
            Ok(mut fault) if *fault == Some(stage) => {
                *fault = None;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn order(&self, order_id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(order_id).cloned())
    }

    async fn order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn order_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        let order_id = tables
            .payments
            .values()
            .find(|p| p.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .map(|p| p.order_id.clone());
        Ok(order_id.and_then(|id| tables.orders.get(&id).cloned()))
    }

    async fn payment(&self, order_id: &str) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(order_id).cloned())
    }

    async fn stock(&self, item: &StockRef) -> Result<Option<i64>> {
        let tables = self.tables.read().await;
        Ok(tables.stock.get(item).copied())
    }

    async fn set_stock(&self, item: StockRef, quantity: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.stock.insert(item, quantity);
        Ok(())
    }

    async fn transact(&self, order_id: &str, work: Work) -> Result<TxOutcome> {
        let mut tables = self.tables.write().await;

        let order = tables
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| PaymentError::not_found(format!("order {order_id}")))?;
        let payment = tables.payments.get(order_id).cloned();

        let mut uow = UnitOfWork::new(order, payment);
        if work(&mut uow)? == Decision::Skip {
            let (order, payment, _) = uow.into_parts();
            return Ok(TxOutcome {
                applied: false,
                order,
                payment,
            });
        }

        let (order, payment, restock) = uow.into_parts();

        if self.take_fault(CommitStage::BeforeRestock) {
            return Err(PaymentError::Storage(
                "injected failure before restock".to_string(),
            ));
        }

        let mut staged_stock = Vec::with_capacity(restock.len());
        for (item, quantity) in restock {
            match tables.stock.get(&item) {
                Some(current) => staged_stock.push((item, current + quantity)),
                None => warn!(item = %item.key(), quantity, "no stock row to restock; skipping"),
            }
        }

        // Nothing below can fail.
        if let Some(payment) = &payment {
            tables.payments.insert(order.id.clone(), payment.clone());
        }
        tables.orders.insert(order.id.clone(), order.clone());
        for (item, quantity) in staged_stock {
            tables.stock.insert(item, quantity);
        }

        Ok(TxOutcome {
            applied: true,
            order,
            payment,
        })
    }
}
