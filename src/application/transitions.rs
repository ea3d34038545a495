//! Dual-record transitions. Each one updates the order and its payment row
//! together inside a unit of work; callers decide whether to commit.

use crate::domain::order::{Order, OrderStatus, PaymentStatus};
use crate::domain::payment::{Payment, PaymentMethodDetails, PaymentState};
use crate::domain::ports::UnitOfWork;
use chrono::{DateTime, Utc};

pub(crate) struct Capture {
    pub gateway_payment_id: String,
    pub signature: Option<String>,
    pub details: Option<PaymentMethodDetails>,
    pub at: DateTime<Utc>,
}

fn fresh_payment(order: &Order, at: DateTime<Utc>) -> Payment {
    Payment::created(
        &order.id,
        order.gateway_order_id.clone(),
        order.total,
        order.currency.clone(),
        at,
    )
}

/// Whether the order already carries a final payment outcome.
pub(crate) fn is_settled(order: &Order) -> bool {
    matches!(
        order.payment_status,
        PaymentStatus::Paid | PaymentStatus::Refunded
    )
}

pub(crate) fn apply_capture(uow: &mut UnitOfWork, capture: Capture) {
    let payment = uow.payment_or_insert_with(|order| fresh_payment(order, capture.at));
    payment.status = PaymentState::Captured;
    payment.gateway_payment_id = Some(capture.gateway_payment_id.clone());
    if capture.signature.is_some() {
        payment.signature = capture.signature;
    }
    if let Some(details) = capture.details {
        payment.details = details;
    }
    payment.error_code = None;
    payment.error_description = None;
    payment.paid_at = Some(capture.at);

    let order = uow.order_mut();
    order.payment_status = PaymentStatus::Paid;
    order.gateway_payment_id = Some(capture.gateway_payment_id);
    if order.status == OrderStatus::Pending {
        order.status = OrderStatus::Confirmed;
    }
}

pub(crate) fn apply_failure(
    uow: &mut UnitOfWork,
    gateway_payment_id: Option<String>,
    error_code: &str,
    error_description: &str,
    at: DateTime<Utc>,
) {
    let payment = uow.payment_or_insert_with(|order| fresh_payment(order, at));
    payment.status = PaymentState::Failed;
    if gateway_payment_id.is_some() {
        payment.gateway_payment_id = gateway_payment_id;
    }
    payment.error_code = Some(error_code.to_string());
    payment.error_description = Some(error_description.to_string());
    payment.failed_at = Some(at);

    uow.order_mut().payment_status = PaymentStatus::Failed;
}

pub(crate) fn apply_refund(uow: &mut UnitOfWork, refund_id: Option<String>, at: DateTime<Utc>) {
    let payment = uow.payment_or_insert_with(|order| fresh_payment(order, at));
    payment.status = PaymentState::Refunded;
    if refund_id.is_some() {
        payment.refund_id = refund_id;
    }
    payment.refunded_at = Some(at);

    let order = uow.order_mut();
    order.payment_status = PaymentStatus::Refunded;
    order.status = OrderStatus::Refunded;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Currency;
    use crate::domain::order::{AddressSnapshot, Owner};
    use rust_decimal_macros::dec;

    fn uow() -> UnitOfWork {
        let order = Order {
            id: "ord_1".into(),
            order_number: "ORD-1".into(),
            owner: Owner::User {
                user_id: "u1".into(),
            },
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            currency: Currency::new("INR").unwrap(),
            subtotal: dec!(1999.00),
            shipping: dec!(0),
            tax: dec!(0),
            total: dec!(1999.00),
            gateway_order_id: Some("order_1".into()),
            gateway_payment_id: None,
            shipping_address: AddressSnapshot::default(),
            line_items: vec![],
            admin_notes: String::new(),
        };
        UnitOfWork::new(order, None)
    }

    #[test]
    fn test_capture_touches_both_records() {
        let mut uow = uow();
        apply_capture(
            &mut uow,
            Capture {
                gateway_payment_id: "pay_1".into(),
                signature: Some("sig".into()),
                details: None,
                at: Utc::now(),
            },
        );
        assert_eq!(uow.order().payment_status, PaymentStatus::Paid);
        assert_eq!(uow.order().status, OrderStatus::Confirmed);
        assert_eq!(uow.order().gateway_payment_id.as_deref(), Some("pay_1"));
        let payment = uow.payment().unwrap();
        assert_eq!(payment.status, PaymentState::Captured);
        assert!(payment.paid_at.is_some());
        assert_eq!(payment.amount, dec!(1999.00));
    }

    #[test]
    fn test_failure_then_refund() {
        let mut uow = uow();
        apply_failure(&mut uow, None, "invalid_signature", "bad", Utc::now());
        assert_eq!(uow.order().payment_status, PaymentStatus::Failed);
        assert_eq!(
            uow.payment().unwrap().error_code.as_deref(),
            Some("invalid_signature")
        );

        apply_refund(&mut uow, Some("rfnd_1".into()), Utc::now());
        assert_eq!(uow.order().status, OrderStatus::Refunded);
        assert_eq!(uow.payment().unwrap().status, PaymentState::Refunded);
        assert!(is_settled(uow.order()));
    }
}
