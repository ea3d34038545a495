use crate::domain::money::Currency;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fulfilment status of an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Forward transitions an admin may request.
    ///
    /// `delivered`, `cancelled` and `refunded` are terminal. Refunds enter
    /// `refunded` through the refund processor, never through this table.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }

    pub fn transition(self, to: OrderStatus) -> Result<OrderStatus> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(PaymentError::bad_request(format!(
                "cannot move order from {self} to {to}"
            )))
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status mirrored on the order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Who placed the order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Owner {
    User { user_id: String },
    Guest { email: String, phone: Option<String> },
}

/// The verified identity behind an incoming request.
#[derive(Debug, PartialEq, Clone)]
pub enum Requester {
    User {
        user_id: String,
        email: Option<String>,
        phone: Option<String>,
    },
    Guest {
        email: String,
    },
}

impl Requester {
    pub fn user(user_id: impl Into<String>) -> Self {
        Requester::User {
            user_id: user_id.into(),
            email: None,
            phone: None,
        }
    }

    pub fn guest(email: impl Into<String>) -> Self {
        Requester::Guest {
            email: email.into(),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Stock-keeping target of a line item.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum StockRef {
    Product(String),
    Variant(String),
}

impl StockRef {
    /// Stable key used by persistent stores.
    pub fn key(&self) -> String {
        match self {
            StockRef::Product(id) => format!("product:{id}"),
            StockRef::Variant(id) => format!("variant:{id}"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LineItem {
    pub item: StockRef,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Copy of the shipping address taken at checkout.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct AddressSnapshot {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub owner: Owner,
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub gateway_order_id: Option<String>,
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    #[serde(default)]
    pub shipping_address: AddressSnapshot,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub admin_notes: String,
}

impl Order {
    /// Ownership check shared by the storefront and guest flows.
    pub fn is_owned_by(&self, requester: &Requester) -> bool {
        match (&self.owner, requester) {
            (Owner::User { user_id }, Requester::User { user_id: who, .. }) => user_id == who,
            (Owner::Guest { email, .. }, Requester::Guest { email: who }) => {
                normalize_email(email) == normalize_email(who)
            }
            _ => false,
        }
    }

    pub fn contact_email(&self) -> Option<&str> {
        match &self.owner {
            Owner::Guest { email, .. } => Some(email),
            Owner::User { .. } => None,
        }
    }

    pub fn contact_phone(&self) -> Option<&str> {
        match &self.owner {
            Owner::Guest { phone, .. } => phone.as_deref(),
            Owner::User { .. } => self.shipping_address.phone.as_deref(),
        }
    }

    pub fn append_admin_note(&mut self, line: &str) {
        if !self.admin_notes.is_empty() {
            self.admin_notes.push('\n');
        }
        self.admin_notes.push_str(line);
    }
}
