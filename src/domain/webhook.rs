use serde::Deserialize;

/// A gateway lifecycle event, decoded only after its signature was accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    PaymentCaptured(PaymentEntity),
    PaymentFailed(PaymentEntity),
    RefundCreated(RefundNotice),
    RefundProcessed(RefundNotice),
    Unknown { event: String },
}

impl GatewayEvent {
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::PaymentCaptured(_) => "payment.captured",
            GatewayEvent::PaymentFailed(_) => "payment.failed",
            GatewayEvent::RefundCreated(_) => "refund.created",
            GatewayEvent::RefundProcessed(_) => "refund.processed",
            GatewayEvent::Unknown { event } => event,
        }
    }

    /// Decodes the gateway envelope. Missing entities for a known event name
    /// are a malformed delivery.
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        let envelope: Envelope = serde_json::from_slice(raw)?;
        let name = envelope.event;
        let payment = envelope.payload.payment.map(|w| w.entity);
        let refund = envelope.payload.refund.map(|w| w.entity);

        let missing = |what: &str| {
            <serde_json::Error as serde::de::Error>::custom(format!(
                "{name} event without {what} entity"
            ))
        };

        Ok(match name.as_str() {
            "payment.captured" => {
                GatewayEvent::PaymentCaptured(payment.ok_or_else(|| missing("payment"))?)
            }
            "payment.failed" => {
                GatewayEvent::PaymentFailed(payment.ok_or_else(|| missing("payment"))?)
            }
            "refund.created" | "refund.processed" => {
                let refund = refund.ok_or_else(|| missing("refund"))?;
                let notice = RefundNotice {
                    gateway_order_id: payment.and_then(|p| p.order_id),
                    refund,
                };
                if name == "refund.created" {
                    GatewayEvent::RefundCreated(notice)
                } else {
                    GatewayEvent::RefundProcessed(notice)
                }
            }
            _ => GatewayEvent::Unknown {
                event: name.clone(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub vpa: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefundEntity {
    pub id: String,
    pub payment_id: String,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundNotice {
    pub gateway_order_id: Option<String>,
    pub refund: RefundEntity,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Deserialize, Default)]
struct Payload {
    payment: Option<Wrapped<PaymentEntity>>,
    refund: Option<Wrapped<RefundEntity>>,
}

#[derive(Deserialize)]
struct Wrapped<T> {
    entity: T,
}
