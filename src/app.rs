//! Engine wiring and the control loop
//!
//! A single task drives everything: sample market conditions, retune
//! parameters, pick a strategy, run it, report. Strategies fan out their
//! own concurrent quote fetches but the loop itself never overlaps cycles.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::arbitrage::ArbitrageEvaluator;
use crate::config::Config;
use crate::market::{MarketDataFeed, PriceSampleFeed};
use crate::quotes::{HttpQuoteClient, QuoteOptimizer, QuoteProvider};
use crate::report::CycleReport;
use crate::risk::{PaperCloser, RiskManager};
use crate::shared::errors::EngineError;
use crate::shared::timing::{DelayProvider, RandomJitter};
use crate::shared::types::{CycleOutcome, MarketCondition};
use crate::strategy::{
    ArbitrageStrategy, FibonacciStrategy, LiquiditySpiderStrategy, SharedConditions, Strategy,
    StrategyScheduler, TriangularStrategy,
};
use crate::tuner::ConfigTuner;

/// Pause after a cycle that ended in an unhandled error
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

pub struct Engine {
    risk: Arc<RiskManager>,
    tuner: Arc<ConfigTuner>,
    feed: Arc<dyn MarketDataFeed>,
    scheduler: StrategyScheduler,
    conditions: SharedConditions,
    jitter: Arc<dyn DelayProvider>,
    shutdown: Arc<AtomicBool>,
    cycle: u64,
}

/// Builds the full engine stack from a validated config
pub fn build(config: &Config) -> Result<Engine> {
    config.validate()?;

    let provider: Arc<dyn QuoteProvider> =
        Arc::new(HttpQuoteClient::new(config.provider.url.clone()));
    let optimizer = Arc::new(QuoteOptimizer::new(
        Arc::clone(&provider),
        config.engine.cache_ttl_ms,
        config.engine.optimization_interval_ms,
    ));
    let evaluator = Arc::new(ArbitrageEvaluator::new(Arc::clone(&optimizer)));
    let risk = Arc::new(RiskManager::new(
        config.risk.clone(),
        config.engine.starting_balance,
        Arc::new(PaperCloser),
    ));
    let tuner = Arc::new(ConfigTuner::new(
        config.tuning.clone(),
        Duration::from_millis(config.engine.tuning_cadence_ms),
    ));
    let conditions: SharedConditions = Arc::new(RwLock::new(MarketCondition::safe_default()));
    let feed: Arc<dyn MarketDataFeed> = Arc::new(PriceSampleFeed::new(
        Arc::clone(&provider),
        config.market.reference_pair.clone(),
        config.market.competitor_count,
    ));

    let strategies: Vec<Arc<dyn Strategy>> = vec![
        Arc::new(ArbitrageStrategy::new(
            Arc::clone(&evaluator),
            Arc::clone(&optimizer),
            Arc::clone(&risk),
            Arc::clone(&tuner),
            Arc::clone(&conditions),
            config.pairs.clone(),
        )),
        Arc::new(TriangularStrategy::new(
            Arc::clone(&optimizer),
            Arc::clone(&risk),
            Arc::clone(&tuner),
            Arc::clone(&conditions),
            config.engine.triangular_route.clone(),
            config.engine.triangular_amount,
        )),
        Arc::new(FibonacciStrategy::new(
            Arc::clone(&optimizer),
            Arc::clone(&risk),
            Arc::clone(&tuner),
            Arc::clone(&conditions),
            config.pairs[0].clone(),
        )),
        Arc::new(LiquiditySpiderStrategy::new(
            Arc::clone(&optimizer),
            Arc::clone(&risk),
            Arc::clone(&tuner),
            Arc::clone(&conditions),
            config.pairs.clone(),
        )),
    ];

    let scheduler = StrategyScheduler::new(
        strategies,
        config.engine.rotation_mode,
        Duration::from_millis(config.engine.strategy_switch_interval_ms),
        config.engine.forced_strategy.clone(),
    )?;

    Ok(Engine {
        risk,
        tuner,
        feed,
        scheduler,
        conditions,
        jitter: Arc::new(RandomJitter::new(config.engine.anti_mev_jitter_ms)),
        shutdown: Arc::new(AtomicBool::new(false)),
        cycle: 0,
    })
}

pub async fn run(config: Config) -> Result<()> {
    let mut engine = build(&config)?;

    info!(
        "🚀 Engine starting | mode {} | {} pairs | balance {:.2}",
        config.engine.rotation_mode.as_str(),
        config.pairs.len(),
        config.engine.starting_balance,
    );

    // One-shot probe; a dead provider degrades every cycle but is not fatal
    let probe = HttpQuoteClient::new(config.provider.url.clone());
    if !probe.is_available().await {
        warn!("⚠️ Quote provider failed its health probe, expect degraded cycles");
    }

    engine.install_shutdown_handler();
    engine.run_loop().await;

    info!("👋 Engine stopped cleanly");
    Ok(())
}

impl Engine {
    /// Flips the shutdown flag on ctrl-c. The cycle in flight finishes;
    /// the loop exits before starting another.
    fn install_shutdown_handler(&self) {
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("🛑 Shutdown requested, finishing the current cycle");
                    shutdown.store(true, Ordering::SeqCst);
                }
                Err(e) => error!("cannot listen for shutdown signal: {}", e),
            }
        });
    }

    async fn run_loop(&mut self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.cycle_once().await {
                Ok(report) => {
                    self.log_cycle(&report);
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    let delay = self.scheduler.get_delay_for_strategy() + self.jitter.jitter();
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("💥 Cycle {} failed: {}", self.cycle, e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
        info!("engine stopped after {} cycles", self.cycle);
    }

    async fn cycle_once(&mut self) -> Result<CycleReport, EngineError> {
        self.cycle += 1;

        // A dead feed degrades to conservative defaults instead of halting
        let mut condition = match self.feed.sample().await {
            Ok(condition) => condition,
            Err(e) => {
                warn!("⚠️ {}, using safe defaults", e);
                MarketCondition::safe_default()
            }
        };
        condition.recent_performance = self.scheduler.aggregate_win_rate();
        *self.conditions.write().await = condition.clone();

        self.tuner.maybe_adjust(&condition).await;

        let selected = self.scheduler.select_strategy(&condition);
        debug!("cycle {}: dispatching '{}'", self.cycle, selected);
        let (result, outcome) = self.scheduler.execute_current().await;

        let metrics = self.risk.get_risk_metrics().await;
        Ok(CycleReport::new(
            self.cycle,
            &result,
            outcome,
            metrics,
            self.scheduler.performance_snapshot(),
        ))
    }

    fn log_cycle(&self, report: &CycleReport) {
        match report.outcome {
            CycleOutcome::Executed => info!("✅ {}", report.summary()),
            CycleOutcome::Rejected => info!("⏭️ {}", report.summary()),
            CycleOutcome::Error => warn!("{}", report.summary()),
        }
        match report.to_json() {
            Ok(json) => debug!("cycle report: {}", json),
            Err(e) => warn!("cycle report serialization failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::shared::errors::{MarketDataError, StrategyError};
    use crate::shared::timing::FixedJitter;
    use crate::shared::types::{CompetitionLevel, RiskLimits, TradeResult};
    use crate::strategy::RotationMode;
    use crate::tuner::TradingParams;

    struct StubFeed {
        condition: MarketCondition,
    }

    #[async_trait]
    impl MarketDataFeed for StubFeed {
        async fn sample(&self) -> Result<MarketCondition, MarketDataError> {
            Ok(self.condition.clone())
        }
    }

    struct DeadFeed;

    #[async_trait]
    impl MarketDataFeed for DeadFeed {
        async fn sample(&self) -> Result<MarketCondition, MarketDataError> {
            Err(MarketDataError::Stale("feed offline".to_string()))
        }
    }

    struct StaticStrategy {
        result: TradeResult,
    }

    #[async_trait]
    impl Strategy for StaticStrategy {
        fn name(&self) -> &'static str {
            "arbitrage"
        }

        fn should_activate(&self, _condition: &MarketCondition) -> bool {
            true
        }

        async fn execute(&self) -> Result<TradeResult, StrategyError> {
            Ok(self.result.clone())
        }
    }

    fn test_engine(feed: Arc<dyn MarketDataFeed>, result: TradeResult) -> Engine {
        let scheduler = StrategyScheduler::new(
            vec![Arc::new(StaticStrategy { result }) as Arc<dyn Strategy>],
            RotationMode::Score,
            Duration::ZERO,
            None,
        )
        .unwrap();

        Engine {
            risk: Arc::new(RiskManager::new(
                RiskLimits::default(),
                10_000.0,
                Arc::new(PaperCloser),
            )),
            tuner: Arc::new(ConfigTuner::new(TradingParams::default(), Duration::ZERO)),
            feed,
            scheduler,
            conditions: Arc::new(RwLock::new(MarketCondition::safe_default())),
            jitter: Arc::new(FixedJitter::new(Duration::ZERO)),
            shutdown: Arc::new(AtomicBool::new(false)),
            cycle: 0,
        }
    }

    #[test]
    fn test_build_wires_engine_from_default_config() {
        let config = Config::with_provider("http://localhost:8545".to_string());
        let engine = build(&config).unwrap();

        assert_eq!(engine.cycle, 0);
        assert_eq!(engine.scheduler.current_strategy_name(), "arbitrage");
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::with_provider("http://localhost:8545".to_string());
        config.pairs.clear();
        assert!(build(&config).is_err());
    }

    #[test]
    fn test_build_rejects_unknown_forced_strategy() {
        let mut config = Config::with_provider("http://localhost:8545".to_string());
        config.engine.forced_strategy = Some("momentum".to_string());
        assert!(build(&config).is_err());
    }

    #[tokio::test]
    async fn test_cycle_produces_attributed_report() {
        let feed = Arc::new(StubFeed {
            condition: MarketCondition {
                volatility: 1.5,
                volume: 800.0,
                competition: CompetitionLevel::Medium,
                time_of_day: 11,
                recent_performance: 0.0,
            },
        });
        let result = TradeResult::executed("arbitrage", "WETH/USDC@500".to_string(), 2.0, 100.0);
        let mut engine = test_engine(feed, result);

        let report = engine.cycle_once().await.unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(report.outcome, CycleOutcome::Executed);
        assert_eq!(report.strategy, "arbitrage");
        assert_eq!(report.performance.len(), 1);

        // The shared condition carries the feed sample plus the win-rate overlay
        let shared = engine.conditions.read().await.clone();
        assert_eq!(shared.volatility, 1.5);
        assert_eq!(shared.recent_performance, 0.5);
    }

    #[tokio::test]
    async fn test_dead_feed_degrades_to_safe_defaults() {
        let result = TradeResult::skipped("arbitrage", "no viable path");
        let mut engine = test_engine(Arc::new(DeadFeed), result);

        let report = engine.cycle_once().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Rejected);

        let shared = engine.conditions.read().await.clone();
        assert_eq!(shared.volatility, MarketCondition::safe_default().volatility);
    }

    #[tokio::test]
    async fn test_run_loop_exits_on_shutdown_flag() {
        let result = TradeResult::skipped("arbitrage", "no viable path");
        let mut engine = test_engine(Arc::new(DeadFeed), result);
        engine.shutdown.store(true, Ordering::SeqCst);

        engine.run_loop().await;
        assert_eq!(engine.cycle, 0);
    }
}
