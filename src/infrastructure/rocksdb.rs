use crate::domain::order::{Order, StockRef};
use crate::domain::payment::Payment;
use crate::domain::ports::{Decision, OrderStore, TxOutcome, UnitOfWork, Work};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Column Family for orders, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for payment rows, keyed by order id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for stock quantities, keyed by `StockRef::key`.
pub const CF_STOCK: &str = "stock";
/// Index from gateway order id to order id.
pub const CF_GATEWAY_ORDERS: &str = "gateway_orders";
/// Index from gateway payment id to order id.
pub const CF_GATEWAY_PAYMENTS: &str = "gateway_payments";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_ORDERS,
    CF_PAYMENTS,
    CF_STOCK,
    CF_GATEWAY_ORDERS,
    CF_GATEWAY_PAYMENTS,
];

/// A persistent store implementation using RocksDB.
///
/// Every commit is a single `WriteBatch`, so order, payment, index and stock
/// changes land together or not at all. Transactions are serialized by an
/// async mutex to make the read-check-write sequence exclusive.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    tx_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            tx_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::Storage(format!("column family '{name}' not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, batch: &mut WriteBatch, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        batch.put_cf(self.cf(cf)?, key, bytes);
        Ok(())
    }

    fn order_via_index(&self, cf: &str, key: &str) -> Result<Option<Order>> {
        match self.db.get_cf(self.cf(cf)?, key.as_bytes())? {
            Some(order_id) => self.read(CF_ORDERS, &order_id),
            None => Ok(None),
        }
    }

    /// Points `current` at `order_id` in an index, dropping `previous` when
    /// the id was replaced by a new gateway attempt.
    fn reindex(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        previous: Option<&str>,
        current: Option<&str>,
        order_id: &str,
    ) -> Result<()> {
        let cf = self.cf(cf)?;
        if let Some(previous) = previous.filter(|p| Some(*p) != current) {
            batch.delete_cf(cf, previous.as_bytes());
        }
        if let Some(current) = current {
            batch.put_cf(cf, current.as_bytes(), order_id.as_bytes());
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert_order(&self, order: Order) -> Result<()> {
        let _guard = self.tx_lock.lock().await;
        let previous: Option<Order> = self.read(CF_ORDERS, order.id.as_bytes())?;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ORDERS, order.id.as_bytes(), &order)?;
        self.reindex(
            &mut batch,
            CF_GATEWAY_ORDERS,
            previous.as_ref().and_then(|o| o.gateway_order_id.as_deref()),
            order.gateway_order_id.as_deref(),
            &order.id,
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn order(&self, order_id: &str) -> Result<Option<Order>> {
        self.read(CF_ORDERS, order_id.as_bytes())
    }

    async fn order_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        self.order_via_index(CF_GATEWAY_ORDERS, gateway_order_id)
    }

    async fn order_by_gateway_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Order>> {
        self.order_via_index(CF_GATEWAY_PAYMENTS, gateway_payment_id)
    }

    async fn payment(&self, order_id: &str) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, order_id.as_bytes())
    }

    async fn stock(&self, item: &StockRef) -> Result<Option<i64>> {
        self.read(CF_STOCK, item.key().as_bytes())
    }

    async fn set_stock(&self, item: StockRef, quantity: i64) -> Result<()> {
        let _guard = self.tx_lock.lock().await;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_STOCK, item.key().as_bytes(), &quantity)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn transact(&self, order_id: &str, work: Work) -> Result<TxOutcome> {
        let _guard = self.tx_lock.lock().await;

        let order: Order = self
            .read(CF_ORDERS, order_id.as_bytes())?
            .ok_or_else(|| PaymentError::not_found(format!("order {order_id}")))?;
        let payment: Option<Payment> = self.read(CF_PAYMENTS, order_id.as_bytes())?;
        let previous_gateway_order_id = order.gateway_order_id.clone();
        let previous_gateway_payment_id = payment.as_ref().and_then(|p| p.gateway_payment_id.clone());

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

        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ORDERS, order.id.as_bytes(), &order)?;
        self.reindex(
            &mut batch,
            CF_GATEWAY_ORDERS,
            previous_gateway_order_id.as_deref(),
            order.gateway_order_id.as_deref(),
            &order.id,
        )?;
        if let Some(payment) = &payment {
            self.put(&mut batch, CF_PAYMENTS, order.id.as_bytes(), payment)?;
        }
        self.reindex(
            &mut batch,
            CF_GATEWAY_PAYMENTS,
            previous_gateway_payment_id.as_deref(),
            payment.as_ref().and_then(|p| p.gateway_payment_id.as_deref()),
            &order.id,
        )?;
        for (item, quantity) in restock {
            let key = item.key();
            match self.read::<i64>(CF_STOCK, key.as_bytes())? {
                Some(current) => {
                    self.put(&mut batch, CF_STOCK, key.as_bytes(), &(current + quantity))?
                }
                None => warn!(item = %key, quantity, "no stock row to restock; skipping"),
            }
        }
        self.db.write(batch)?;

        Ok(TxOutcome {
            applied: true,
            order,
            payment,
        })
    }
}
