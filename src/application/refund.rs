use crate::application::transitions;
use crate::domain::money::{Currency, to_minor_units};
use crate::domain::order::{Order, OrderStatus, PaymentStatus};
use crate::domain::payment::Payment;
use crate::domain::ports::{Decision, GatewayRef, OrderStoreRef};
use crate::error::{PaymentError, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Admin input for a refund settled outside the gateway.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ManualRefund {
    pub reason: String,
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub refund_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct RefundReceipt {
    pub order_id: String,
    pub refund_id: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// False when a concurrent webhook had already recorded the refund.
    pub applied: bool,
}

pub struct RefundProcessor {
    store: OrderStoreRef,
    gateway: GatewayRef,
}

impl RefundProcessor {
    pub fn new(store: OrderStoreRef, gateway: GatewayRef) -> Self {
        Self { store, gateway }
    }

    async fn load(&self, order_id: &str) -> Result<(Order, Option<Payment>)> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| PaymentError::not_found(format!("order {order_id}")))?;
        let payment = self.store.payment(order_id).await?;
        Ok((order, payment))
    }

    /// Refunds a captured payment through the gateway. `amount` defaults to
    /// the full captured amount.
    #[instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        order_id: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundReceipt> {
        let (order, payment) = self.load(order_id).await?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(PaymentError::bad_request(format!(
                "order payment is {}",
                order.payment_status
            )));
        }
        let payment = payment
            .filter(Payment::is_captured)
            .ok_or_else(|| PaymentError::bad_request("no captured payment for order"))?;
        let gateway_payment_id = payment
            .gateway_payment_id
            .clone()
            .ok_or_else(|| PaymentError::bad_request("payment has no gateway payment id"))?;

        let refund_amount = match amount {
            Some(a) if a <= Decimal::ZERO || a > payment.amount => {
                return Err(PaymentError::ValidationError(format!(
                    "refund amount must be greater than 0 and at most {}",
                    payment.amount
                )));
            }
            Some(a) => a,
            None => payment.amount,
        };
        let amount_minor = amount
            .map(|a| to_minor_units(a, &payment.currency))
            .transpose()?;

        let refund = self
            .gateway
            .refund_payment(&gateway_payment_id, amount_minor)
            .await?;

        let now = Utc::now();
        let refund_id = refund.id.clone();
        let note = format!(
            "[{}] Gateway refund {}: {} {} on payment {}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
            refund.id,
            refund_amount,
            payment.currency,
            gateway_payment_id
        );
        let outcome = self
            .store
            .transact(
                order_id,
                Box::new(move |uow| {
                    // the refund webhook may have landed first
                    if uow.order().payment_status == PaymentStatus::Refunded {
                        return Ok(Decision::Skip);
                    }
                    transitions::apply_refund(uow, Some(refund_id), now);
                    uow.order_mut().append_admin_note(&note);
                    Ok(Decision::Commit)
                }),
            )
            .await?;

        if outcome.applied {
            info!(refund_id = %refund.id, amount = %refund_amount, "gateway refund recorded");
        } else {
            warn!(refund_id = %refund.id, "refund already recorded by another path");
        }

        Ok(RefundReceipt {
            order_id: outcome.order.id,
            refund_id: Some(refund.id),
            amount: refund_amount,
            currency: payment.currency,
            status: outcome.order.status,
            payment_status: outcome.order.payment_status,
            applied: outcome.applied,
        })
    }

    /// Records a refund settled outside the gateway and restocks every line
    /// item, all in one commit.
    #[instrument(skip(self, request))]
    pub async fn manual_refund(
        &self,
        order_id: &str,
        request: ManualRefund,
    ) -> Result<RefundReceipt> {
        if request.reason.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "refund reason is required".to_string(),
            ));
        }
        let (order, payment) = self.load(order_id).await?;
        ensure_manually_refundable(&order, payment.as_ref())?;

        let now = Utc::now();
        let outcome = self
            .store
            .transact(
                order_id,
                Box::new(move |uow| {
                    ensure_manually_refundable(uow.order(), uow.payment())?;

                    let method = uow.payment().map_or("manual", Payment::method).to_string();
                    let order = uow.order().clone();
                    let note = format!(
                        "[{}] Manual refund of {} {} via {}. Reason: {}. Transaction ref: {}. Refund date: {}",
                        now.to_rfc3339_opts(SecondsFormat::Secs, true),
                        order.total,
                        order.currency,
                        method,
                        request.reason.trim(),
                        request.transaction_ref.as_deref().unwrap_or("n/a"),
                        request
                            .refund_date
                            .unwrap_or_else(|| now.date_naive())
                            .format("%Y-%m-%d"),
                    );

                    transitions::apply_refund(uow, None, now);
                    uow.order_mut().append_admin_note(&note);
                    for line in order.line_items {
                        uow.restock(line.item, line.quantity);
                    }
                    Ok(Decision::Commit)
                }),
            )
            .await?;

        info!(
            order_id = %outcome.order.id,
            items = outcome.order.line_items.len(),
            "manual refund recorded and stock restored"
        );

        Ok(RefundReceipt {
            order_id: outcome.order.id.clone(),
            refund_id: None,
            amount: outcome.order.total,
            currency: outcome.order.currency.clone(),
            status: outcome.order.status,
            payment_status: outcome.order.payment_status,
            applied: outcome.applied,
        })
    }
}

fn ensure_manually_refundable(order: &Order, payment: Option<&Payment>) -> Result<()> {
    if order.payment_status != PaymentStatus::Paid {
        return Err(PaymentError::bad_request(format!(
            "order payment is {}",
            order.payment_status
        )));
    }
    if order.status == OrderStatus::Refunded {
        return Err(PaymentError::bad_request("order is already refunded"));
    }
    let paid_through_gateway = order.gateway_payment_id.is_some()
        || payment.is_some_and(|p| p.gateway_payment_id.is_some());
    if paid_through_gateway {
        return Err(PaymentError::bad_request(
            "order was paid through the gateway; use the gateway refund",
        ));
    }
    Ok(())
}
