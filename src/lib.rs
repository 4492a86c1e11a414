//! Jupiter round-trip arbitrage agent
//!
//! Scans candidate tokens, prices base → token → base round trips through the
//! aggregator, subtracts the full relay/fee model, and executes profitable
//! trips as two tipped legs through the Jito block engine.

pub mod candidate_source;
pub mod circuit_breaker;
pub mod config;
pub mod cost_calculator;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod execution;
pub mod jito_relay;
pub mod jito_tip_monitor;
pub mod jupiter;
pub mod notifier;
pub mod rpc_client;
pub mod stats;
pub mod submitter;
pub mod tx_builder;
pub mod types;
pub mod watchlist;

pub use config::Config;
pub use engine::ArbitrageEngine;
pub use error::{ArbError, ArbResult};
