// Best-effort alert delivery
//
// Notification failures are logged here and never returned: the trading
// pipeline must not stall or abort because a chat API is down.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::stats::StatsSnapshot;
use crate::types::ArbitrageOpportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    /// Needs a human now (stranded position)
    Urgent,
}

impl AlertLevel {
    fn prefix(&self) -> &'static str {
        match self {
            AlertLevel::Info => "ℹ️",
            AlertLevel::Warning => "⚠️",
            AlertLevel::Urgent => "🚨 URGENT",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, level: AlertLevel, message: &str);
}

/// Writes alerts to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, level: AlertLevel, message: &str) {
        match level {
            AlertLevel::Info => info!("{} {}", level.prefix(), message),
            AlertLevel::Warning => warn!("{} {}", level.prefix(), message),
            AlertLevel::Urgent => error!("{} {}", level.prefix(), message),
        }
    }
}

/// Telegram Bot API sink
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API returned {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, level: AlertLevel, message: &str) {
        // Urgent alerts always reach the log too
        if level == AlertLevel::Urgent {
            error!("{} {}", level.prefix(), message);
        }

        let text = format!("{} {}", level.prefix(), message);
        match self.send(&text).await {
            Ok(()) => debug!("📨 Telegram notification sent"),
            Err(e) => warn!("⚠️ Telegram notification failed: {}", e),
        }
    }
}

pub fn startup_message(paper_trading: bool, bases: &[String]) -> String {
    format!(
        "<b>Arbitrage bot started</b>\nMode: {}\nBases: {}",
        if paper_trading { "PAPER" } else { "LIVE" },
        bases.join(", ")
    )
}

pub fn stranded_message(opp: &ArbitrageOpportunity, buy_signature: &str, reason: &str) -> String {
    format!(
        "<b>STRANDED POSITION</b>\nHolding: <code>{}</code> ({})\nBuy tx: <code>{}</code>\nSell failed: {}\nManual recovery required.",
        opp.token_asset_id, opp.token_symbol, buy_signature, reason
    )
}

pub fn circuit_open_message(failures: u32, cooldown: Duration) -> String {
    format!(
        "<b>Circuit breaker open</b>\n{} consecutive failed cycles, pausing {}s",
        failures,
        cooldown.as_secs()
    )
}

pub fn summary_message(snapshot: &StatsSnapshot) -> String {
    format!(
        "<b>Summary</b>\nTrades: {} ({} ok / {} failed)\nSkipped: {}\nNet: {:.6} SOL",
        snapshot.total_trades,
        snapshot.successful_trades,
        snapshot.failed_trades,
        snapshot.simulation_skipped,
        snapshot.net_profit
    )
}

pub fn shutdown_message(snapshot: &StatsSnapshot) -> String {
    format!("<b>Arbitrage bot stopped</b>\n{}", summary_message(snapshot))
}
