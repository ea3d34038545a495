//! Inbound adapters: the HTTP API and the start-up seed loader.

pub mod http;
pub mod seed;
