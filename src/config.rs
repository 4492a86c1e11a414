use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ArbError;
use crate::types::BaseCurrency;

/// Default Jito tip floor endpoint
pub const DEFAULT_TIP_FLOOR_URL: &str = "https://bundles.jito.wtf/api/v1/bundles/tip_floor";

/// Jito block-engine region used for transaction relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRegion {
    Mainnet,
    Amsterdam,
    Frankfurt,
    NewYork,
    Tokyo,
    SaltLakeCity,
}

impl RelayRegion {
    pub fn base_url(&self) -> &'static str {
        match self {
            RelayRegion::Mainnet => "https://mainnet.block-engine.jito.wtf",
            RelayRegion::Amsterdam => "https://amsterdam.mainnet.block-engine.jito.wtf",
            RelayRegion::Frankfurt => "https://frankfurt.mainnet.block-engine.jito.wtf",
            RelayRegion::NewYork => "https://ny.mainnet.block-engine.jito.wtf",
            RelayRegion::Tokyo => "https://tokyo.mainnet.block-engine.jito.wtf",
            RelayRegion::SaltLakeCity => "https://slc.mainnet.block-engine.jito.wtf",
        }
    }
}

impl FromStr for RelayRegion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "default" => Ok(RelayRegion::Mainnet),
            "amsterdam" | "ams" => Ok(RelayRegion::Amsterdam),
            "frankfurt" | "fra" => Ok(RelayRegion::Frankfurt),
            "ny" | "newyork" | "new_york" => Ok(RelayRegion::NewYork),
            "tokyo" => Ok(RelayRegion::Tokyo),
            "slc" | "saltlakecity" => Ok(RelayRegion::SaltLakeCity),
            other => Err(anyhow::anyhow!(
                "Invalid JITO_REGION: {} (expected mainnet, amsterdam, frankfurt, ny, tokyo, slc)",
                other
            )),
        }
    }
}

/// Private key string that never shows up in Debug output
#[derive(Clone)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// Configuration for the arbitrage bot
#[derive(Debug, Clone)]
pub struct Config {
    pub solana_rpc_url: String,
    pub wallet_private_key: SecretKey,
    pub jupiter_api_url: String,
    pub jupiter_api_key: Option<String>,

    // Trading
    pub trade_size_sol: f64,
    pub min_profit_percent: f64,
    pub max_price_impact_pct: f64,
    pub slippage_bps: u16,
    pub max_accounts: u8,
    pub base_currencies: Vec<BaseCurrency>,
    pub usdc_per_sol: f64,
    pub paper_trading: bool,

    // Fee model
    pub base_fee_lamports: u64,
    pub priority_fee_estimate_lamports: u64,

    // Relay
    pub jito_region: RelayRegion,
    pub tip_floor_url: String,
    pub tip_cache_ttl: Duration,

    // Failure containment
    pub max_consecutive_failures: u32,
    pub circuit_cooldown: Duration,

    // Pacing and timeouts
    pub scan_interval: Duration,
    pub candidate_pacing: Duration,
    pub leg_settle_delay: Duration,
    pub quote_timeout: Duration,
    pub confirm_timeout: Duration,

    // Candidates
    pub max_candidates: usize,
    pub min_volume_24h_usd: f64,
    pub min_liquidity_usd: f64,
    pub discovery_rest_url: Option<String>,
    pub discovery_ws_url: Option<String>,
    pub discovery_ws_subscribe: Option<String>,
    pub watchlist_path: PathBuf,
    pub watchlist_capacity: usize,
    pub seen_set_path: PathBuf,

    // Collaborators
    pub stats_path: PathBuf,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Validate URL format (basic security check)
    ///
    /// - Validates URL scheme (http://, https://, ws://, wss://)
    /// - Blocks injection attacks via newline, carriage return, or null characters
    fn validate_url(url: &str, name: &str) -> Result<()> {
        if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("ws://")
            && !url.starts_with("wss://")
        {
            return Err(anyhow::anyhow!(
                "Invalid {}: must start with http://, https://, ws://, or wss:// (got: {})",
                name,
                url
            ));
        }

        if url.contains('\n') || url.contains('\r') || url.contains('\0') {
            return Err(anyhow::anyhow!(
                "Invalid {}: contains suspicious characters",
                name
            ));
        }

        Ok(())
    }

    /// Validate base58 wallet private key format
    ///
    /// - Length must be 80-90 characters (Solana 64-byte keys in base58)
    /// - Only valid base58 characters allowed (no O, 0, I, l)
    fn validate_private_key(key: &str) -> Result<()> {
        if key.len() < 80 || key.len() > 90 {
            return Err(anyhow::anyhow!(
                "Invalid wallet private key length: {} (expected 80-90 characters)",
                key.len()
            ));
        }

        if !key.chars().all(
            |c| matches!(c, '1'..='9' | 'A'..='H' | 'J'..='N' | 'P'..='Z' | 'a'..='k' | 'm'..='z'),
        ) {
            return Err(anyhow::anyhow!(
                "Invalid wallet private key: contains non-base58 characters"
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables (and `.env` if present)
    ///
    /// `SOLANA_RPC_URL` and `WALLET_PRIVATE_KEY` are required; every other
    /// option has a default. A missing required option is fatal.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let solana_rpc_url = get("SOLANA_RPC_URL")
            .ok_or_else(|| ArbError::ConfigMissing("SOLANA_RPC_URL".to_string()))?;
        Self::validate_url(&solana_rpc_url, "SOLANA_RPC_URL")?;

        let wallet_private_key = get("WALLET_PRIVATE_KEY")
            .ok_or_else(|| ArbError::ConfigMissing("WALLET_PRIVATE_KEY".to_string()))?;
        Self::validate_private_key(&wallet_private_key)?;

        let jupiter_api_url = get("JUPITER_API_URL")
            .unwrap_or_else(|| "https://lite-api.jup.ag/swap/v1".to_string());
        Self::validate_url(&jupiter_api_url, "JUPITER_API_URL")?;

        let tip_floor_url =
            get("JITO_TIP_FLOOR_URL").unwrap_or_else(|| DEFAULT_TIP_FLOOR_URL.to_string());
        Self::validate_url(&tip_floor_url, "JITO_TIP_FLOOR_URL")?;

        let discovery_rest_url = get("DISCOVERY_REST_URL");
        if let Some(ref url) = discovery_rest_url {
            Self::validate_url(url, "DISCOVERY_REST_URL")?;
        }
        let discovery_ws_url = get("DISCOVERY_WS_URL");
        if let Some(ref url) = discovery_ws_url {
            Self::validate_url(url, "DISCOVERY_WS_URL")?;
        }

        let usdc_per_sol: f64 = parse_or(&get, "USDC_PER_SOL", 150.0)?;
        let base_currencies = get("BASE_CURRENCIES")
            .unwrap_or_else(|| "SOL,USDC".to_string())
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| BaseCurrency::from_symbol(s, usdc_per_sol))
            .collect::<Result<Vec<_>>>()
            .context("Failed to parse BASE_CURRENCIES")?;

        let jito_region: RelayRegion = get("JITO_REGION")
            .unwrap_or_else(|| "mainnet".to_string())
            .parse()?;

        let config = Self {
            solana_rpc_url,
            wallet_private_key: SecretKey::new(wallet_private_key),
            jupiter_api_url,
            jupiter_api_key: get("JUPITER_API_KEY"),

            trade_size_sol: parse_or(&get, "TRADE_SIZE_SOL", 0.05)?,
            min_profit_percent: parse_or(&get, "MIN_PROFIT_PERCENT", 0.1)?,
            max_price_impact_pct: parse_or(&get, "MAX_PRICE_IMPACT_PCT", 1.0)?,
            slippage_bps: parse_or(&get, "SLIPPAGE_BPS", 50)?,
            max_accounts: parse_or(&get, "MAX_ACCOUNTS", 40)?,
            base_currencies,
            usdc_per_sol,
            paper_trading: get("PAPER_TRADING")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),

            base_fee_lamports: parse_or(&get, "BASE_FEE_LAMPORTS", 5_000)?,
            priority_fee_estimate_lamports: parse_or(
                &get,
                "PRIORITY_FEE_ESTIMATE_LAMPORTS",
                100_000,
            )?,

            jito_region,
            tip_floor_url,
            tip_cache_ttl: Duration::from_secs(parse_or(&get, "TIP_CACHE_SECS", 300)?),

            max_consecutive_failures: parse_or(&get, "MAX_CONSECUTIVE_FAILURES", 5)?,
            circuit_cooldown: Duration::from_secs(parse_or(&get, "CIRCUIT_COOLDOWN_SECS", 60)?),

            scan_interval: Duration::from_millis(parse_or(&get, "SCAN_INTERVAL_MS", 2_000)?),
            candidate_pacing: Duration::from_millis(parse_or(&get, "CANDIDATE_PACING_MS", 250)?),
            leg_settle_delay: Duration::from_millis(parse_or(
                &get,
                "LEG_SETTLE_DELAY_MS",
                2_000,
            )?),
            quote_timeout: Duration::from_millis(parse_or(&get, "QUOTE_TIMEOUT_MS", 5_000)?),
            confirm_timeout: Duration::from_secs(parse_or(&get, "CONFIRM_TIMEOUT_SECS", 15)?),

            max_candidates: parse_or(&get, "MAX_CANDIDATES", 50)?,
            min_volume_24h_usd: parse_or(&get, "MIN_VOLUME_24H_USD", 100_000.0)?,
            min_liquidity_usd: parse_or(&get, "MIN_LIQUIDITY_USD", 50_000.0)?,
            discovery_rest_url,
            discovery_ws_url,
            discovery_ws_subscribe: get("DISCOVERY_WS_SUBSCRIBE"),
            watchlist_path: PathBuf::from(
                get("WATCHLIST_PATH").unwrap_or_else(|| "watchlist.json".to_string()),
            ),
            watchlist_capacity: parse_or(&get, "WATCHLIST_CAPACITY", 20)?,
            seen_set_path: PathBuf::from(
                get("SEEN_SET_PATH").unwrap_or_else(|| "seen_tokens.json".to_string()),
            ),

            stats_path: PathBuf::from(get("STATS_PATH").unwrap_or_else(|| "stats.json".to_string())),
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info,jup_arb_bot=debug".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.trade_size_sol.is_finite() || self.trade_size_sol <= 0.0 {
            return Err(anyhow::anyhow!(
                "Invalid trade_size_sol: {} (must be > 0)",
                self.trade_size_sol
            ));
        }

        if !self.min_profit_percent.is_finite() || self.min_profit_percent < 0.0 {
            return Err(anyhow::anyhow!(
                "Invalid min_profit_percent: {} (must be >= 0)",
                self.min_profit_percent
            ));
        }

        if !self.max_price_impact_pct.is_finite() || self.max_price_impact_pct <= 0.0 {
            return Err(anyhow::anyhow!(
                "Invalid max_price_impact_pct: {} (must be > 0)",
                self.max_price_impact_pct
            ));
        }

        if !self.usdc_per_sol.is_finite() || self.usdc_per_sol <= 0.0 {
            return Err(anyhow::anyhow!(
                "Invalid usdc_per_sol: {} (must be > 0)",
                self.usdc_per_sol
            ));
        }

        if self.slippage_bps > 10_000 {
            return Err(anyhow::anyhow!(
                "Invalid slippage_bps: {} (max 10000)",
                self.slippage_bps
            ));
        }

        if self.base_currencies.is_empty() {
            return Err(anyhow::anyhow!("BASE_CURRENCIES must name at least one base"));
        }

        if self.max_consecutive_failures == 0 {
            return Err(anyhow::anyhow!(
                "Invalid max_consecutive_failures: 0 (breaker would trip on every cycle)"
            ));
        }

        if self.max_candidates == 0 {
            return Err(anyhow::anyhow!("Invalid max_candidates: 0 (bot would do nothing)"));
        }

        // At least one slot must stay open for seeds and discoveries
        if self.watchlist_capacity >= self.max_candidates {
            return Err(anyhow::anyhow!(
                "Invalid watchlist_capacity: {} must be below max_candidates: {}",
                self.watchlist_capacity,
                self.max_candidates
            ));
        }

        if self.telegram_bot_token.is_some() != self.telegram_chat_id.is_some() {
            return Err(anyhow::anyhow!(
                "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together"
            ));
        }

        Ok(())
    }

    /// Decode the configured wallet
    pub fn keypair(&self) -> Result<Keypair> {
        let bytes = bs58::decode(self.wallet_private_key.expose())
            .into_vec()
            .context("WALLET_PRIVATE_KEY is not valid base58")?;
        Keypair::from_bytes(&bytes)
            .map_err(|e| anyhow::anyhow!("WALLET_PRIVATE_KEY is not a valid keypair: {}", e))
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}: invalid value '{}'", name, raw)),
        None => Ok(default),
    }
}
