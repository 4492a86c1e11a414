#![allow(dead_code)]

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use jup_arb_bot::discovery::{DiscoveredToken, DiscoveryFeed};
use jup_arb_bot::error::{ArbError, ArbResult};
use jup_arb_bot::execution::LegExecutor;
use jup_arb_bot::jupiter::QuoteSource;
use jup_arb_bot::notifier::{AlertLevel, Notifier};
use jup_arb_bot::tx_builder::{compile_with_tip, PendingTransaction};
use jup_arb_bot::types::Quote;
use jup_arb_bot::Config;

pub const TOKEN: &str = "TokenMint1111111111111111111111111111111111";

/// Valid config with overrides applied on top of the two required keys
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert(
        "SOLANA_RPC_URL".to_string(),
        "http://127.0.0.1:8899".to_string(),
    );
    vars.insert(
        "WALLET_PRIVATE_KEY".to_string(),
        bs58::encode(Keypair::new().to_bytes()).into_string(),
    );
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(move |name| vars.get(name).cloned()).unwrap()
}

pub fn quote(input: &str, output: &str, in_amount: u64, out_amount: u64) -> Quote {
    Quote {
        input_mint: input.to_string(),
        output_mint: output.to_string(),
        in_amount,
        out_amount,
        price_impact_pct: 0.1,
        route_label: "Mock".to_string(),
        raw: serde_json::Value::Null,
    }
}

/// Quotes keyed by (input, output); unknown pairs are unavailable
#[derive(Default)]
pub struct MockQuotes {
    routes: HashMap<(String, String), (u64, f64)>,
}

impl MockQuotes {
    pub fn route(mut self, input: &str, output: &str, out_amount: u64) -> Self {
        self.routes
            .insert((input.to_string(), output.to_string()), (out_amount, 0.1));
        self
    }

    pub fn route_with_impact(mut self, input: &str, output: &str, out_amount: u64, impact: f64) -> Self {
        self.routes
            .insert((input.to_string(), output.to_string()), (out_amount, impact));
        self
    }
}

#[async_trait]
impl QuoteSource for MockQuotes {
    async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64) -> ArbResult<Quote> {
        let (out_amount, impact) = self
            .routes
            .get(&(input_mint.to_string(), output_mint.to_string()))
            .copied()
            .ok_or_else(|| ArbError::quote_unavailable("no route"))?;
        let mut q = quote(input_mint, output_mint, amount, out_amount);
        q.price_impact_pct = impact;
        Ok(q)
    }
}

pub fn pending_leg() -> PendingTransaction {
    let payer = Keypair::new().pubkey();
    let tip_account = Pubkey::new_unique();
    let message = compile_with_tip(&payer, &[], &tip_account, 10_000, &[], Hash::default()).unwrap();
    PendingTransaction {
        instructions: Vec::new(),
        payer,
        lookup_tables: Vec::new(),
        recent_blockhash: Hash::default(),
        message,
        tip_lamports: 10_000,
        tip_account,
        expanded_tables: Vec::new(),
    }
}

/// Executor with scripted simulate / submit results
pub struct ScriptedExecutor {
    simulate_ok: bool,
    submits: Mutex<VecDeque<ArbResult<Signature>>>,
    pub builds: AtomicUsize,
    pub submit_calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(simulate_ok: bool, submits: Vec<ArbResult<Signature>>) -> Self {
        Self {
            simulate_ok,
            submits: Mutex::new(submits.into()),
            builds: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    pub fn always_ok() -> Self {
        Self::new(
            true,
            (0..16).map(|_| Ok(Signature::new_unique())).collect(),
        )
    }
}

#[async_trait]
impl LegExecutor for ScriptedExecutor {
    async fn build(&self, _quote: &Quote) -> ArbResult<PendingTransaction> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(pending_leg())
    }

    async fn simulate(&self, _leg: &PendingTransaction) -> ArbResult<()> {
        if self.simulate_ok {
            Ok(())
        } else {
            Err(ArbError::SimulationRejected("slippage exceeded".to_string()))
        }
    }

    async fn submit(&self, _leg: &PendingTransaction) -> ArbResult<Signature> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ArbError::submission_failed("script exhausted")))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(AlertLevel, String)>>,
}

impl RecordingNotifier {
    pub fn at_level(&self, level: AlertLevel) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, level: AlertLevel, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

pub fn token(id: &str, volume: f64, liquidity: f64) -> DiscoveredToken {
    DiscoveredToken {
        asset_id: id.to_string(),
        symbol: id.to_uppercase(),
        volume_24h_usd: Some(volume),
        liquidity_usd: Some(liquidity),
        source: "static".to_string(),
    }
}

/// Feed returning a fixed batch, or failing
pub struct StaticFeed {
    pub tokens: Option<Vec<DiscoveredToken>>,
}

#[async_trait]
impl DiscoveryFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<DiscoveredToken>> {
        self.tokens
            .clone()
            .ok_or_else(|| anyhow::anyhow!("feed offline"))
    }
}
