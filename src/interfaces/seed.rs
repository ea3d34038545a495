use crate::domain::order::{Order, StockRef};
use crate::domain::ports::OrderStore;
use crate::error::Result;
use serde::Deserialize;
use std::io::Read;
use tracing::{debug, info};

#[derive(Debug, Deserialize, PartialEq)]
pub struct StockRow {
    pub item: StockRef,
    pub quantity: i64,
}

/// Checked-out orders and stock levels loaded at start-up.
///
/// Stands in for the checkout flow, which lives outside this service.
#[derive(Debug, Deserialize, Default)]
pub struct Seed {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub stock: Vec<StockRow>,
}

impl Seed {
    /// Parses a seed document from any `Read` source (e.g., File, Stdin).
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Loads rows the store does not hold yet. Orders and stock rows that
    /// already exist are left alone, so reseeding a persistent store never
    /// rewinds state written by earlier runs.
    pub async fn load_into(self, store: &dyn OrderStore) -> Result<()> {
        let (mut orders, mut rows, mut skipped) = (0, 0, 0);
        for order in self.orders {
            if store.order(&order.id).await?.is_some() {
                debug!(order_id = %order.id, "order already stored; not reseeding");
                skipped += 1;
                continue;
            }
            store.insert_order(order).await?;
            orders += 1;
        }
        for row in self.stock {
            if store.stock(&row.item).await?.is_some() {
                debug!(item = %row.item.key(), "stock row already stored; not reseeding");
                skipped += 1;
                continue;
            }
            store.set_stock(row.item, row.quantity).await?;
            rows += 1;
        }
        info!(orders, stock_rows = rows, skipped, "seed data loaded");
        Ok(())
    }
}
