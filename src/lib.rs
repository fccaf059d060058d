//! cardex library
//!
//! Catalog access for trading-card series, sets and cards backed by a local
//! read-through cache. The binary and the integration tests both build on
//! these modules.

pub mod cache;
pub mod cli;
pub mod data;
pub mod service;
pub mod settings;
