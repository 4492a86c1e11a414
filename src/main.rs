//! Jupiter round-trip arbitrage bot

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jup_arb_bot::{ArbitrageEngine, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Missing required settings are fatal before anything starts
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter("info").init();
            error!("❌ Configuration error: {:#}", e);
            return Err(e);
        }
    };

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("💰 Starting Jupiter Arbitrage Bot");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("✅ Configuration loaded:");
    info!("  • Trade size: {} SOL", config.trade_size_sol);
    info!("  • Min profit: {}%", config.min_profit_percent);
    info!("  • Max price impact: {}%", config.max_price_impact_pct);
    info!(
        "  • Bases: {}",
        config
            .base_currencies
            .iter()
            .map(|b| b.symbol.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("  • Relay region: {:?}", config.jito_region);
    info!(
        "  • Trading mode: {}",
        if config.paper_trading { "PAPER" } else { "LIVE" }
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let mut engine = ArbitrageEngine::from_config(&config, shutdown_rx).await?;

    // The engine observes the signal between steps, never mid-submission
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received (Ctrl+C)");
                let _ = shutdown_tx.send(());
            }
            Err(err) => error!("❌ Failed to listen for shutdown signal: {}", err),
        }
        // Keep the sender alive until the process exits
        std::future::pending::<()>().await;
    });

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("🚀 Arbitrage Bot is LIVE - Scanning for opportunities...");
    info!("💡 Press Ctrl+C to stop gracefully");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let result = engine.run().await;
    match result {
        Ok(()) => info!("👋 Arbitrage Bot shutdown complete"),
        Err(ref e) => error!("❌ Arbitrage engine failed: {:#}", e),
    }
    result
}
