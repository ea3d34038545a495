//! Adapters behind the domain ports: stores, gateways and notifiers.

pub mod in_memory;
pub mod noop;
pub mod notify;
pub mod razorpay;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod signature;
