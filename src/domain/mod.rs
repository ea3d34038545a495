//! Domain model: orders, payments, gateway events and the ports the
//! application layer talks through.

pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod webhook;
