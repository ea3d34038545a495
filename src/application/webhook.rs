use crate::application::transitions::{self, Capture};
use crate::domain::order::{Order, PaymentStatus};
use crate::domain::payment::PaymentMethodDetails;
use crate::domain::ports::{Decision, GatewayRef, OrderStoreRef};
use crate::domain::webhook::{GatewayEvent, PaymentEntity, RefundNotice};
use crate::error::Result;
use crate::infrastructure::notify::Notifications;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Body returned to the gateway. `handled: false` maps to a 400.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
pub struct WebhookAck {
    pub handled: bool,
}

impl WebhookAck {
    const HANDLED: WebhookAck = WebhookAck { handled: true };
    const REJECTED: WebhookAck = WebhookAck { handled: false };
}

/// Applies gateway push notifications. Every event is idempotent against
/// redelivery and against the client-driven verify call.
pub struct WebhookVerifier {
    store: OrderStoreRef,
    gateway: GatewayRef,
    notifications: Notifications,
}

impl WebhookVerifier {
    pub fn new(store: OrderStoreRef, gateway: GatewayRef, notifications: Notifications) -> Self {
        Self {
            store,
            gateway,
            notifications,
        }
    }

    /// Never fails. Anything that goes wrong is logged and reported as not handled.
    pub async fn handle(&self, raw_body: &[u8], signature: Option<&str>) -> WebhookAck {
        if !self.gateway.webhook_enabled() {
            warn!("webhook received but no webhook secret is configured");
            return WebhookAck::REJECTED;
        }
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("webhook received without a signature");
            return WebhookAck::REJECTED;
        };
        let Some(event) = self.gateway.verify_webhook_signature(raw_body, signature) else {
            warn!(bytes = raw_body.len(), "webhook signature rejected");
            return WebhookAck::REJECTED;
        };

        let name = event.name().to_string();
        match self.apply(event).await {
            Ok(()) => {
                debug!(event = %name, "webhook handled");
                WebhookAck::HANDLED
            }
            Err(e) => {
                error!(event = %name, error = %e, "webhook processing failed");
                WebhookAck::REJECTED
            }
        }
    }

    async fn apply(&self, event: GatewayEvent) -> Result<()> {
        match event {
            GatewayEvent::PaymentCaptured(payment) => self.on_captured(payment).await,
            GatewayEvent::PaymentFailed(payment) => self.on_failed(payment).await,
            GatewayEvent::RefundCreated(notice) | GatewayEvent::RefundProcessed(notice) => {
                self.on_refund(notice).await
            }
            GatewayEvent::Unknown { event } => {
                debug!(event = %event, "ignoring unhandled gateway event");
                Ok(())
            }
        }
    }

    async fn find_by_gateway_order(&self, gateway_order_id: Option<&str>) -> Result<Option<Order>> {
        let Some(gateway_order_id) = gateway_order_id else {
            return Ok(None);
        };
        let order = self.store.order_by_gateway_order_id(gateway_order_id).await?;
        if order.is_none() {
            info!(gateway_order_id, "webhook for unknown gateway order; acknowledging");
        }
        Ok(order)
    }

    async fn on_captured(&self, payment: PaymentEntity) -> Result<()> {
        let Some(order) = self.find_by_gateway_order(payment.order_id.as_deref()).await? else {
            return Ok(());
        };

        let capture = Capture {
            gateway_payment_id: payment.id.clone(),
            signature: None,
            details: Some(details_of(&payment)),
            at: Utc::now(),
        };
        let outcome = self
            .store
            .transact(
                &order.id,
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
            info!(order_id = %order.id, gateway_payment_id = %payment.id, "payment captured via webhook");
            self.notifications.order_confirmed(outcome.order).await;
        } else {
            debug!(order_id = %order.id, "capture already recorded");
        }
        Ok(())
    }

    async fn on_failed(&self, payment: PaymentEntity) -> Result<()> {
        let Some(order) = self.find_by_gateway_order(payment.order_id.as_deref()).await? else {
            return Ok(());
        };

        let gateway_payment_id = payment.id.clone();
        let error_code = payment
            .error_code
            .clone()
            .unwrap_or_else(|| "payment_failed".to_string());
        let error_description = payment
            .error_description
            .clone()
            .unwrap_or_else(|| "payment failed at the gateway".to_string());
        let outcome = self
            .store
            .transact(
                &order.id,
                Box::new(move |uow| {
                    // a late failure for an earlier attempt must not undo a capture
                    if transitions::is_settled(uow.order()) {
                        return Ok(Decision::Skip);
                    }
                    transitions::apply_failure(
                        uow,
                        Some(gateway_payment_id),
                        &error_code,
                        &error_description,
                        Utc::now(),
                    );
                    Ok(Decision::Commit)
                }),
            )
            .await?;

        if outcome.applied {
            info!(order_id = %order.id, gateway_payment_id = %payment.id, "payment failed via webhook");
        }
        Ok(())
    }

    async fn on_refund(&self, notice: RefundNotice) -> Result<()> {
        let order = match self
            .find_by_gateway_order(notice.gateway_order_id.as_deref())
            .await?
        {
            Some(order) => Some(order),
            None => {
                self.store
                    .order_by_gateway_payment_id(&notice.refund.payment_id)
                    .await?
            }
        };
        let Some(order) = order else {
            info!(gateway_payment_id = %notice.refund.payment_id, "refund for unknown payment; acknowledging");
            return Ok(());
        };

        let refund_id = notice.refund.id.clone();
        let outcome = self
            .store
            .transact(
                &order.id,
                Box::new(move |uow| {
                    if uow.order().payment_status == PaymentStatus::Refunded {
                        return Ok(Decision::Skip);
                    }
                    transitions::apply_refund(uow, Some(refund_id), Utc::now());
                    Ok(Decision::Commit)
                }),
            )
            .await?;

        if outcome.applied {
            info!(order_id = %order.id, refund_id = %notice.refund.id, "refund recorded via webhook");
        }
        Ok(())
    }
}

fn details_of(payment: &PaymentEntity) -> PaymentMethodDetails {
    PaymentMethodDetails {
        method: payment.method.clone(),
        bank: payment.bank.clone(),
        wallet: payment.wallet.clone(),
        vpa: payment.vpa.clone(),
        ..PaymentMethodDetails::default()
    }
}
