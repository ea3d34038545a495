use crate::application::transitions::{self, Capture};
use crate::domain::money::{Currency, to_minor_units};
use crate::domain::order::{Order, OrderStatus, PaymentStatus, Requester};
use crate::domain::payment::{Payment, PaymentState};
use crate::domain::ports::{Decision, GatewayRef, OrderStoreRef, TxOutcome};
use crate::error::{PaymentError, Result};
use crate::infrastructure::notify::Notifications;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Contact details pre-filled into the client-side payment widget.
#[derive(Debug, Serialize, PartialEq, Clone, Default)]
pub struct Prefill {
    pub name: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct GatewayOrderInfo {
    pub order_id: String,
    pub order_number: String,
    pub gateway_order_id: String,
    pub key_id: String,
    /// In the currency's smallest unit.
    pub amount: i64,
    pub currency: Currency,
    pub prefill: Prefill,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct VerifyResult {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub gateway_payment_id: Option<String>,
    /// True when another path (usually the webhook) had already applied the capture.
    pub already_processed: bool,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentSummary {
    pub status: PaymentState,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentStatusView {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment: Option<PaymentSummary>,
}

/// Creates gateway orders and completes them from the client-driven verify call.
pub struct Reconciler {
    store: OrderStoreRef,
    gateway: GatewayRef,
    notifications: Notifications,
}

impl Reconciler {
    pub fn new(store: OrderStoreRef, gateway: GatewayRef, notifications: Notifications) -> Self {
        Self {
            store,
            gateway,
            notifications,
        }
    }

    /// Loads an order the requester owns. A foreign order is reported exactly
    /// like a missing one.
    async fn load_owned(&self, requester: &Requester, order_id: &str) -> Result<Order> {
        match self.store.order(order_id).await? {
            Some(order) if order.is_owned_by(requester) => Ok(order),
            _ => Err(PaymentError::not_found(format!("order {order_id}"))),
        }
    }

    #[instrument(skip(self, requester))]
    pub async fn create_payment_order(
        &self,
        requester: &Requester,
        order_id: &str,
    ) -> Result<GatewayOrderInfo> {
        let order = self.load_owned(requester, order_id).await?;
        ensure_payable(&order, self.store.payment(order_id).await?.as_ref())?;

        let amount = to_minor_units(order.total, &order.currency)?;
        let mut notes = BTreeMap::new();
        notes.insert("order_id".to_string(), order.id.clone());
        notes.insert("order_number".to_string(), order.order_number.clone());

        let gateway_order = self
            .gateway
            .create_order(amount, &order.currency, &order.order_number, notes)
            .await?;

        let now = Utc::now();
        let gateway_order_id = gateway_order.id.clone();
        let outcome = self
            .store
            .transact(
                order_id,
                Box::new(move |uow| {
                    ensure_payable(uow.order(), uow.payment())?;
                    let order = uow.order();
                    let payment = Payment::created(
                        &order.id,
                        Some(gateway_order_id.clone()),
                        order.total,
                        order.currency.clone(),
                        now,
                    );
                    uow.upsert_payment(payment);
                    uow.order_mut().gateway_order_id = Some(gateway_order_id);
                    Ok(Decision::Commit)
                }),
            )
            .await?;

        info!(gateway_order_id = %gateway_order.id, amount, "gateway order created");

        Ok(GatewayOrderInfo {
            order_id: outcome.order.id.clone(),
            order_number: outcome.order.order_number.clone(),
            gateway_order_id: gateway_order.id,
            key_id: self.gateway.key_id().to_string(),
            amount,
            currency: outcome.order.currency.clone(),
            prefill: prefill(requester, &outcome.order),
        })
    }

    #[instrument(skip(self, requester, signature))]
    pub async fn verify_payment(
        &self,
        requester: &Requester,
        order_id: &str,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<VerifyResult> {
        let order = self.load_owned(requester, order_id).await?;
        if order.gateway_order_id.as_deref() != Some(gateway_order_id) {
            return Err(PaymentError::bad_request("invalid gateway order id"));
        }

        let now = Utc::now();
        if !self
            .gateway
            .verify_payment_signature(gateway_order_id, gateway_payment_id, signature)
        {
            warn!("payment signature mismatch");
            let payment_id = gateway_payment_id.to_string();
            self.store
                .transact(
                    order_id,
                    Box::new(move |uow| {
                        // a forged call must not undo a capture that already happened
                        if transitions::is_settled(uow.order()) {
                            return Ok(Decision::Skip);
                        }
                        transitions::apply_failure(
                            uow,
                            Some(payment_id),
                            "invalid_signature",
                            "payment signature verification failed",
                            now,
                        );
                        Ok(Decision::Commit)
                    }),
                )
                .await?;
            return Err(PaymentError::bad_request("verification failed"));
        }

        let details = match self.gateway.get_payment_details(gateway_payment_id).await {
            Ok(payment) => Some(payment.details),
            Err(e) => {
                warn!(error = %e, "could not fetch payment details; continuing without them");
                None
            }
        };

        let capture = Capture {
            gateway_payment_id: gateway_payment_id.to_string(),
            signature: Some(signature.to_string()),
            details,
            at: now,
        };
        let outcome = self
            .store
            .transact(
                order_id,
                Box::new(move |uow| {
                    if transitions::is_settled(uow.order()) {
                        return Ok(Decision::Skip);
                    }
                    transitions::apply_capture(uow, capture);
                    Ok(Decision::Commit)
                }),
            )
            .await?;

        if outcome.applied {
            info!("payment captured via verify");
            self.notifications.order_confirmed(outcome.order.clone()).await;
        } else {
            info!(payment_status = %outcome.order.payment_status, "payment already settled");
        }

        Ok(verify_result(&outcome))
    }

    pub async fn payment_status(
        &self,
        requester: &Requester,
        order_id: &str,
    ) -> Result<PaymentStatusView> {
        let order = self.load_owned(requester, order_id).await?;
        let payment = self.store.payment(order_id).await?;
        Ok(PaymentStatusView {
            order_id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_status: order.payment_status,
            payment: payment.map(|p| PaymentSummary {
                status: p.status,
                amount: p.amount,
                currency: p.currency,
                method: p.details.method,
                paid_at: p.paid_at,
                refunded_at: p.refunded_at,
            }),
        })
    }
}

fn ensure_payable(order: &Order, payment: Option<&Payment>) -> Result<()> {
    if order.status != OrderStatus::Pending {
        return Err(PaymentError::bad_request(format!(
            "order is {}",
            order.status
        )));
    }
    if payment.is_some_and(Payment::is_captured) {
        return Err(PaymentError::bad_request("already paid"));
    }
    Ok(())
}

fn prefill(requester: &Requester, order: &Order) -> Prefill {
    let name = Some(order.shipping_address.name.clone()).filter(|n| !n.is_empty());
    match requester {
        Requester::User { email, phone, .. } => Prefill {
            name,
            email: email.clone(),
            contact: phone.clone().or_else(|| order.contact_phone().map(str::to_string)),
        },
        Requester::Guest { email } => Prefill {
            name,
            email: Some(email.trim().to_string()),
            contact: order.contact_phone().map(str::to_string),
        },
    }
}

fn verify_result(outcome: &TxOutcome) -> VerifyResult {
    VerifyResult {
        order_id: outcome.order.id.clone(),
        order_number: outcome.order.order_number.clone(),
        status: outcome.order.status,
        payment_status: outcome.order.payment_status,
        gateway_payment_id: outcome.order.gateway_payment_id.clone(),
        already_processed: !outcome.applied,
    }
}
