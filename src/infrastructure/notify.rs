use crate::domain::order::Order;
use crate::domain::ports::{Notifier, NotifierRef};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Notifier that only logs. Stands in for the e-mail service.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            recipient = order.contact_email().unwrap_or("<account email>"),
            "order confirmation queued"
        );
        Ok(())
    }
}

/// Fire-and-forget dispatch of confirmation notices.
///
/// Each send runs on its own task; failures are logged and never reach the
/// caller. `drain` waits for everything still in flight.
#[derive(Clone)]
pub struct Notifications {
    notifier: NotifierRef,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl Notifications {
    pub fn new(notifier: NotifierRef) -> Self {
        Self {
            notifier,
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub async fn order_confirmed(&self, order: Order) {
        let notifier = Arc::clone(&self.notifier);
        let mut in_flight = self.in_flight.lock().await;
        // reap finished sends so the set doesn't grow unbounded
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            if let Err(e) = notifier.send_order_confirmation(&order).await {
                warn!(order_id = %order.id, error = %e, "order confirmation failed");
            }
        });
    }

    pub async fn drain(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "notification task aborted");
            }
        }
    }
}
