use crate::domain::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Created,
    Captured,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentState::Created => "created",
            PaymentState::Captured => "captured",
            PaymentState::Failed => "failed",
            PaymentState::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Cosmetic details about how the payer paid.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct PaymentMethodDetails {
    pub method: Option<String>,
    pub card_network: Option<String>,
    pub card_last4: Option<String>,
    pub bank: Option<String>,
    pub wallet: Option<String>,
    pub vpa: Option<String>,
}

/// The current gateway attempt for an order. One row per order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub order_id: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub signature: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentState,
    #[serde(default)]
    pub details: PaymentMethodDetails,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// A fresh attempt. Used as the overwrite value of the per-order upsert,
    /// so every field a previous attempt may have set starts out cleared.
    pub fn created(
        order_id: &str,
        gateway_order_id: Option<String>,
        amount: Decimal,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.to_string(),
            gateway_order_id,
            gateway_payment_id: None,
            signature: None,
            amount,
            currency,
            status: PaymentState::Created,
            details: PaymentMethodDetails::default(),
            error_code: None,
            error_description: None,
            refund_id: None,
            created_at: now,
            paid_at: None,
            failed_at: None,
            refunded_at: None,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.status == PaymentState::Captured
    }

    pub fn method(&self) -> &str {
        self.details.method.as_deref().unwrap_or("manual")
    }
}
