use crate::config::GatewayConfig;
use crate::domain::money::Currency;
use crate::domain::payment::PaymentMethodDetails;
use crate::domain::ports::{GatewayOrder, GatewayPayment, GatewayRefund, PaymentGateway};
use crate::domain::webhook::GatewayEvent;
use crate::error::{PaymentError, Result};
use crate::infrastructure::signature;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, warn};

/// Razorpay REST adapter.
///
/// Any transport failure or non-2xx response becomes `PaymentError::Gateway`
/// carrying the provider's error description. Calls are never retried here.
pub struct RazorpayGateway {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::Gateway(format!("http client: {e}")))?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gateway request failed");
                PaymentError::Gateway(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let description = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.description)
                .unwrap_or_else(|_| format!("gateway responded with {status}"));
            warn!(%status, %description, "gateway rejected request");
            return Err(PaymentError::Gateway(description));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PaymentError::Gateway(format!("unreadable gateway response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn webhook_enabled(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &Currency,
        receipt: &str,
        notes: BTreeMap<String, String>,
    ) -> Result<GatewayOrder> {
        let body = json!({
            "amount": amount_minor,
            "currency": currency.code(),
            "receipt": receipt,
            "notes": notes,
        });
        let order: OrderResponse = self
            .send(self.http.post(self.url("orders")).json(&body))
            .await?;
        Ok(GatewayOrder {
            id: order.id,
            status: order.status,
            amount_minor: order.amount,
            currency: Currency::new(&order.currency)?,
        })
    }

    fn verify_payment_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        let message = signature::payment_message(gateway_order_id, gateway_payment_id);
        signature::verify(&self.config.key_secret, message.as_bytes(), signature)
    }

    async fn capture_payment(
        &self,
        gateway_payment_id: &str,
        amount_minor: i64,
        currency: &Currency,
    ) -> Result<GatewayPayment> {
        let body = json!({ "amount": amount_minor, "currency": currency.code() });
        let path = format!("payments/{gateway_payment_id}/capture");
        let payment: PaymentResponse = self.send(self.http.post(self.url(&path)).json(&body)).await?;
        Ok(payment.into())
    }

    async fn refund_payment(
        &self,
        gateway_payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<GatewayRefund> {
        let body = match amount_minor {
            Some(amount) => json!({ "amount": amount }),
            None => json!({}),
        };
        let path = format!("payments/{gateway_payment_id}/refund");
        let refund: RefundResponse = self.send(self.http.post(self.url(&path)).json(&body)).await?;
        Ok(GatewayRefund {
            id: refund.id,
            payment_id: refund.payment_id,
            amount_minor: refund.amount,
            status: refund.status,
        })
    }

    async fn get_payment_details(&self, gateway_payment_id: &str) -> Result<GatewayPayment> {
        let path = format!("payments/{gateway_payment_id}");
        let payment: PaymentResponse = self.send(self.http.get(self.url(&path))).await?;
        Ok(payment.into())
    }

    fn verify_webhook_signature(
        &self,
        raw_payload: &[u8],
        signature: &str,
    ) -> Option<GatewayEvent> {
        let secret = self.config.webhook_secret.as_deref()?;
        if !signature::verify(secret, raw_payload, signature) {
            return None;
        }
        match GatewayEvent::from_slice(raw_payload) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "signed webhook payload could not be decoded");
                None
            }
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    description: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Deserialize)]
struct CardResponse {
    network: Option<String>,
    last4: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
    id: String,
    order_id: Option<String>,
    status: String,
    amount: i64,
    method: Option<String>,
    card: Option<CardResponse>,
    bank: Option<String>,
    wallet: Option<String>,
    vpa: Option<String>,
}

impl From<PaymentResponse> for GatewayPayment {
    fn from(p: PaymentResponse) -> Self {
        let (card_network, card_last4) = match p.card {
            Some(card) => (card.network, card.last4),
            None => (None, None),
        };
        GatewayPayment {
            id: p.id,
            order_id: p.order_id,
            status: p.status,
            amount_minor: p.amount,
            details: PaymentMethodDetails {
                method: p.method,
                card_network,
                card_last4,
                bank: p.bank,
                wallet: p.wallet,
                vpa: p.vpa,
            },
        }
    }
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
    payment_id: String,
    amount: i64,
    status: String,
}
