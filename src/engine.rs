// Main scanning loop
//
// One cooperative stream: candidates → evaluate → execute → record, strictly
// sequential, at most one round trip in flight. Periodic tasks (health,
// summary, relay keep-alive, push feed) run on their own timers and are
// aborted at shutdown. The stop signal is only observed between steps,
// never in the middle of a submission.

use anyhow::Result;
use solana_sdk::signer::Signer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::candidate_source::{default_seeds, CandidateSource};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::discovery::{DiscoveryFilter, DiscoveryIngest, PushFeed, RestDiscoveryFeed};
use crate::evaluator::OpportunityEvaluator;
use crate::execution::{execute_round_trip, ChainLegExecutor, LegExecutor};
use crate::jito_relay::JitoRelay;
use crate::jito_tip_monitor::{TipFloorCache, TipOracle};
use crate::jupiter::JupiterClient;
use crate::notifier::{
    circuit_open_message, shutdown_message, startup_message, summary_message, AlertLevel,
    LogNotifier, Notifier, TelegramNotifier,
};
use crate::rpc_client::SolanaRpcClient;
use crate::stats::StatsStore;
use crate::submitter::Submitter;
use crate::tx_builder::TransactionBuilder;
use crate::types::TradeOutcome;
use crate::watchlist::{SeenSet, Watchlist};

const HEALTH_INTERVAL: Duration = Duration::from_secs(60);
const SUMMARY_INTERVAL: Duration = Duration::from_secs(3600);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scan_interval: Duration,
    pub candidate_pacing: Duration,
    pub leg_settle_delay: Duration,
    pub paper_trading: bool,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan_interval: config.scan_interval,
            candidate_pacing: config.candidate_pacing,
            leg_settle_delay: config.leg_settle_delay,
            paper_trading: config.paper_trading,
        }
    }
}

/// What one cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    pub candidates: usize,
    pub opportunities: usize,
    pub outcomes: Vec<TradeOutcome>,
}

impl CycleReport {
    /// Any failed or stranded trade fails the whole cycle
    pub fn failed(&self) -> bool {
        self.outcomes.iter().any(TradeOutcome::is_failure)
    }

    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().any(TradeOutcome::is_success)
    }
}

/// Live collaborators only the process needs (not used in tests)
#[derive(Default)]
struct Background {
    relay: Option<Arc<JitoRelay>>,
    rpc: Option<Arc<SolanaRpcClient>>,
    push_feed: Option<PushFeed>,
    handles: Vec<JoinHandle<()>>,
}

pub struct ArbitrageEngine {
    candidates: CandidateSource,
    evaluator: OpportunityEvaluator,
    executor: Option<Arc<dyn LegExecutor>>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<StatsStore>,
    breaker: Arc<CircuitBreaker>,
    settings: EngineSettings,
    running: Arc<AtomicBool>,
    shutdown_rx: broadcast::Receiver<()>,
    background: Background,
}

impl ArbitrageEngine {
    /// Assemble from injected components. `executor = None` never trades.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        candidates: CandidateSource,
        evaluator: OpportunityEvaluator,
        executor: Option<Arc<dyn LegExecutor>>,
        notifier: Arc<dyn Notifier>,
        stats: Arc<StatsStore>,
        breaker: Arc<CircuitBreaker>,
        settings: EngineSettings,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            candidates,
            evaluator,
            executor,
            notifier,
            stats,
            breaker,
            settings,
            running: Arc::new(AtomicBool::new(true)),
            shutdown_rx,
            background: Background::default(),
        }
    }

    /// Wire every live client from configuration
    pub async fn from_config(config: &Config, shutdown_rx: broadcast::Receiver<()>) -> Result<Self> {
        let keypair = Arc::new(config.keypair()?);
        info!("🔑 Wallet: {}", keypair.pubkey());

        let jupiter = Arc::new(JupiterClient::new(config)?);
        let tips: Arc<dyn TipOracle> = Arc::new(TipFloorCache::new(
            config.tip_floor_url.clone(),
            config.tip_cache_ttl,
        ));
        let rpc = Arc::new(SolanaRpcClient::new(config.solana_rpc_url.clone()));

        let evaluator = OpportunityEvaluator::new(config, jupiter.clone(), tips.clone());

        let mut background = Background {
            rpc: Some(rpc.clone()),
            ..Default::default()
        };

        let executor: Option<Arc<dyn LegExecutor>> = if config.paper_trading {
            info!("📝 PAPER TRADING: opportunities are logged, never submitted");
            None
        } else {
            let relay = Arc::new(JitoRelay::new(config.jito_region)?);
            background.relay = Some(relay.clone());
            let builder =
                TransactionBuilder::new(jupiter.clone(), rpc.clone(), tips, keypair.pubkey());
            let submitter = Submitter::new(rpc, relay, keypair, config.confirm_timeout);
            Some(Arc::new(ChainLegExecutor::new(builder, submitter)))
        };

        let seen = Arc::new(SeenSet::load(config.seen_set_path.clone()).await?);
        let watchlist = Watchlist::new(config.watchlist_path.clone(), config.watchlist_capacity);
        let ingest = Arc::new(DiscoveryIngest::new(
            DiscoveryFilter {
                min_volume_24h_usd: config.min_volume_24h_usd,
                min_liquidity_usd: config.min_liquidity_usd,
            },
            seen,
            watchlist.clone(),
        ));

        let mut candidates = CandidateSource::new(
            default_seeds(),
            ingest,
            watchlist,
            config.max_candidates,
            config.quote_timeout,
        );
        if let Some(ref url) = config.discovery_rest_url {
            candidates = candidates.with_feed(Arc::new(RestDiscoveryFeed::new(
                url.clone(),
                config.quote_timeout,
            )?));
        }
        if let Some(ref url) = config.discovery_ws_url {
            let (feed, events) = PushFeed::new(url.clone(), config.discovery_ws_subscribe.clone());
            candidates = candidates.with_push_events(events);
            background.push_feed = Some(feed);
        }

        let notifier: Arc<dyn Notifier> =
            match (&config.telegram_bot_token, &config.telegram_chat_id) {
                (Some(token), Some(chat)) => {
                    Arc::new(TelegramNotifier::new(token.clone(), chat.clone()))
                }
                _ => Arc::new(LogNotifier),
            };

        let stats = Arc::new(StatsStore::open(config.stats_path.clone()).await?);
        let breaker = Arc::new(CircuitBreaker::new(
            config.max_consecutive_failures,
            config.circuit_cooldown,
        ));

        let mut engine = Self::new(
            candidates,
            evaluator,
            executor,
            notifier,
            stats,
            breaker,
            EngineSettings::from_config(config),
            shutdown_rx,
        );
        engine.background = background;
        Ok(engine)
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stats(&self) -> Arc<StatsStore> {
        self.stats.clone()
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Loop until the stop signal, then flush stats and notify
    pub async fn run(&mut self) -> Result<()> {
        info!("🔄 Starting arbitrage scanning loop...");
        self.spawn_background();

        let bases: Vec<String> = self
            .evaluator
            .bases()
            .iter()
            .map(|b| b.symbol.clone())
            .collect();
        self.notifier
            .notify(
                AlertLevel::Info,
                &startup_message(self.settings.paper_trading, &bases),
            )
            .await;

        loop {
            if self.shutdown_rx.try_recv().is_ok() || !self.is_running() {
                info!("🛑 Shutdown signal received - stopping arbitrage loop gracefully");
                break;
            }

            let report = self.run_cycle().await;
            self.stats.record_cycle().await;

            if report.failed() && self.breaker.record_failure() {
                let cooldown = self.breaker.cooldown();
                self.notifier
                    .notify(
                        AlertLevel::Warning,
                        &circuit_open_message(self.breaker.consecutive_failures(), cooldown),
                    )
                    .await;

                if !self.pause(cooldown).await {
                    break;
                }
                self.breaker.reset();
                continue;
            }

            if !self.pause(self.settings.scan_interval).await {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Sleep unless the stop signal arrives first. False = stop.
    async fn pause(&mut self, duration: Duration) -> bool {
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            Ok(()) = self.shutdown_rx.recv() => true,
        };
        if interrupted {
            info!("🛑 Shutdown during pause");
            return false;
        }
        self.is_running()
    }

    /// One scan over the current candidate list
    pub async fn run_cycle(&self) -> CycleReport {
        let candidates = self.candidates.get_candidates().await;
        let mut report = CycleReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for (i, candidate) in candidates.iter().enumerate() {
            if !self.is_running() {
                debug!("Stop requested, ending cycle early");
                break;
            }
            if i > 0 {
                tokio::time::sleep(self.settings.candidate_pacing).await;
            }

            let opp = match self.evaluator.find_opportunity(candidate).await {
                Some(opp) => opp,
                None => continue,
            };
            report.opportunities += 1;
            self.stats.record_opportunity().await;

            let executor = match self.executor {
                Some(ref executor) if !self.settings.paper_trading => executor,
                _ => {
                    info!(
                        "📝 PAPER: {} net {:.6} SOL ({:.3}%)",
                        opp.description(),
                        opp.net_profit_sol(),
                        opp.profit_percent
                    );
                    continue;
                }
            };

            let outcome = execute_round_trip(
                executor.as_ref(),
                &self.notifier,
                &opp,
                self.settings.leg_settle_delay,
            )
            .await;

            if outcome.is_success() {
                self.breaker.record_success();
            }
            if let Err(e) = self.stats.record(&outcome).await {
                error!("❌ Failed to persist stats: {:#}", e);
            }
            report.outcomes.push(outcome);
        }

        debug!(
            "Cycle done: {} candidates, {} opportunities, {} trades",
            report.candidates,
            report.opportunities,
            report.outcomes.len()
        );
        report
    }

    fn spawn_background(&mut self) {
        // Stop flag follows the broadcast signal even mid-cycle
        let running = self.running.clone();
        let mut stop_rx = self.shutdown_rx.resubscribe();
        self.background.handles.push(tokio::spawn(async move {
            if stop_rx.recv().await.is_ok() {
                running.store(false, Ordering::SeqCst);
            }
        }));

        let stats = self.stats.clone();
        let breaker = self.breaker.clone();
        let rpc = self.background.rpc.clone();
        self.background.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = stats.snapshot().await;
                let rpc_ok = match rpc {
                    Some(ref rpc) => rpc.health_check().await,
                    None => true,
                };
                info!(
                    "💓 Health: breaker {} ({} failures) | cycles {} | opps {} | trades {} | net {:.6} SOL | rpc {}",
                    if breaker.is_open() { "OPEN" } else { "closed" },
                    breaker.consecutive_failures(),
                    snapshot.cycles,
                    snapshot.opportunities_detected,
                    snapshot.total_trades,
                    snapshot.net_profit,
                    if rpc_ok { "ok" } else { "DOWN" }
                );
            }
        }));

        let stats = self.stats.clone();
        let notifier = self.notifier.clone();
        self.background.handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = stats.snapshot().await;
                notifier
                    .notify(AlertLevel::Info, &summary_message(&snapshot))
                    .await;
            }
        }));

        if let Some(relay) = self.background.relay.clone() {
            self.background.handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(KEEP_ALIVE_INTERVAL);
                loop {
                    ticker.tick().await;
                    if let Err(e) = relay.keep_alive().await {
                        warn!("⚠️ Relay keep-alive failed: {:#}", e);
                    }
                }
            }));
        }

        if let Some(feed) = self.background.push_feed.take() {
            let shutdown = self.shutdown_rx.resubscribe();
            self.background
                .handles
                .push(tokio::spawn(feed.run(shutdown)));
        }
    }

    /// Final flush: stop tasks, write stats, send the summary
    async fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.background.handles.drain(..) {
            handle.abort();
        }

        if let Err(e) = self.stats.flush().await {
            error!("❌ Final stats flush failed: {:#}", e);
        }

        let snapshot = self.stats.snapshot().await;
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 Final Statistics:");
        info!("  • Cycles: {}", snapshot.cycles);
        info!("  • Opportunities detected: {}", snapshot.opportunities_detected);
        info!(
            "  • Trades: {} ({} ok / {} failed, {} skipped)",
            snapshot.total_trades,
            snapshot.successful_trades,
            snapshot.failed_trades,
            snapshot.simulation_skipped
        );
        info!("  • Net profit: {:.6} SOL", snapshot.net_profit);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        self.notifier
            .notify(AlertLevel::Info, &shutdown_message(&snapshot))
            .await;
    }
}
