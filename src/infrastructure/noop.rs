use crate::domain::money::Currency;
use crate::domain::payment::PaymentMethodDetails;
use crate::domain::ports::{GatewayOrder, GatewayPayment, GatewayRefund, PaymentGateway};
use crate::domain::webhook::GatewayEvent;
use crate::error::Result;
use crate::infrastructure::signature;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Gateway used when no provider is configured.
///
/// Returns the same shapes as a real adapter without any network I/O.
/// Signatures are still checked locally, so with secrets supplied the full
/// verify and webhook flows can be driven in tests.
#[derive(Debug, Clone, Default)]
pub struct NoopGateway {
    key_secret: String,
    webhook_secret: Option<String>,
}

impl NoopGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets(key_secret: impl Into<String>, webhook_secret: Option<String>) -> Self {
        Self {
            key_secret: key_secret.into(),
            webhook_secret,
        }
    }
}

#[async_trait]
impl PaymentGateway for NoopGateway {
    fn key_id(&self) -> &str {
        "noop"
    }

    fn webhook_enabled(&self) -> bool {
        self.webhook_secret.is_some()
    }

    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &Currency,
        receipt: &str,
        _notes: BTreeMap<String, String>,
    ) -> Result<GatewayOrder> {
        let id = format!("order_noop_{}", Uuid::new_v4().simple());
        debug!(gateway_order_id = %id, receipt, amount_minor, "noop gateway order created");
        Ok(GatewayOrder {
            id,
            status: "created".to_string(),
            amount_minor,
            currency: currency.clone(),
        })
    }

    fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        let message = signature::payment_message(gateway_order_id, gateway_payment_id);
        signature::verify(&self.key_secret, message.as_bytes(), signature)
    }

    async fn capture_payment(
        &self,
        gateway_payment_id: &str,
        amount_minor: i64,
        _currency: &Currency,
    ) -> Result<GatewayPayment> {
        Ok(GatewayPayment {
            id: gateway_payment_id.to_string(),
            order_id: None,
            status: "captured".to_string(),
            amount_minor,
            details: PaymentMethodDetails::default(),
        })
    }

    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<GatewayRefund> {
        Ok(GatewayRefund {
            id: format!("rfnd_noop_{}", Uuid::new_v4().simple()),
            payment_id: gateway_payment_id.to_string(),
            amount_minor: amount_minor.unwrap_or_default(),
            status: "processed".to_string(),
        })
    }

    async fn get_payment_details(&self, gateway_payment_id: &str) -> Result<GatewayPayment> {
        Ok(GatewayPayment {
            id: gateway_payment_id.to_string(),
            order_id: None,
            status: "captured".to_string(),
            amount_minor: 0,
            details: PaymentMethodDetails::default(),
        })
    }

    fn verify_webhook_signature(
        &self,
        raw_payload: &[u8],
        signature: &str,
    ) -> Option<GatewayEvent> {
        let secret = self.webhook_secret.as_deref()?;
        if !signature::verify(secret, raw_payload, signature) {
            return None;
        }
        GatewayEvent::from_slice(raw_payload).ok()
    }
}
