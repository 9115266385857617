//! Strategy selection and execution driving
//!
//! Two mutually exclusive rotation policies, picked at configuration time.
//! Score mode ranks eligible strategies by performance plus condition
//! bonuses; round-robin walks the registration order. A forced strategy
//! name pins selection, honored in score mode only.

use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{Strategy, ARBITRAGE, FIBONACCI, LIQUIDITY_SPIDER, TRIANGULAR};
use crate::shared::errors::{ConfigError, StrategyError};
use crate::shared::types::{
    CompetitionLevel, CycleOutcome, MarketCondition, PerformanceMetrics, TradeResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    Score,
    RoundRobin,
}

impl RotationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationMode::Score => "score",
            RotationMode::RoundRobin => "round_robin",
        }
    }
}

impl Default for RotationMode {
    fn default() -> Self {
        RotationMode::Score
    }
}

impl FromStr for RotationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(RotationMode::Score),
            "round_robin" | "round-robin" => Ok(RotationMode::RoundRobin),
            other => Err(ConfigError::Invalid {
                field: "rotation_mode",
                reason: format!("unknown mode '{}', expected score or round_robin", other),
            }),
        }
    }
}

struct StrategyRecord {
    strategy: Arc<dyn Strategy>,
    metrics: PerformanceMetrics,
}

pub struct StrategyScheduler {
    records: Vec<StrategyRecord>,
    mode: RotationMode,
    forced: Option<String>,
    current: usize,
    last_switch: Option<Instant>,
    switch_interval: Duration,
}

impl StrategyScheduler {
    pub fn new(
        strategies: Vec<Arc<dyn Strategy>>,
        mode: RotationMode,
        switch_interval: Duration,
        forced: Option<String>,
    ) -> Result<Self, StrategyError> {
        if strategies.is_empty() {
            return Err(StrategyError::NoneRegistered);
        }

        let records: Vec<StrategyRecord> = strategies
            .into_iter()
            .map(|strategy| StrategyRecord {
                strategy,
                metrics: PerformanceMetrics::new(),
            })
            .collect();

        let mut current = 0;
        if let Some(name) = &forced {
            let index = records
                .iter()
                .position(|r| r.strategy.name() == name)
                .ok_or_else(|| StrategyError::Unknown(name.clone()))?;
            if mode == RotationMode::Score {
                info!("📌 Forced strategy override: {}", name);
                current = index;
            } else {
                warn!("forced strategy '{}' is ignored in round_robin mode", name);
            }
        }

        Ok(Self {
            records,
            mode,
            forced,
            current,
            last_switch: None,
            switch_interval,
        })
    }

    pub fn current_strategy_name(&self) -> &'static str {
        self.records[self.current].strategy.name()
    }

    /// Picks the strategy for the coming cycle. Re-selection runs at most
    /// once per switch interval; a forced strategy bypasses both the
    /// interval and the scoring.
    pub fn select_strategy(&mut self, condition: &MarketCondition) -> &'static str {
        if self.mode == RotationMode::Score {
            if let Some(forced) = &self.forced {
                if let Some(index) = self
                    .records
                    .iter()
                    .position(|r| r.strategy.name() == forced)
                {
                    self.current = index;
                    return self.current_strategy_name();
                }
            }
        }

        if let Some(last) = self.last_switch {
            if last.elapsed() < self.switch_interval {
                return self.current_strategy_name();
            }
        }
        self.last_switch = Some(Instant::now());

        match self.mode {
            RotationMode::Score => self.select_by_score(condition),
            RotationMode::RoundRobin => self.advance_round_robin(condition),
        }
        self.current_strategy_name()
    }

    fn select_by_score(&mut self, condition: &MarketCondition) {
        let scored: Vec<(usize, f64)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.strategy.should_activate(condition))
            .map(|(i, r)| (i, Self::score(r, condition)))
            .collect();

        if scored.is_empty() {
            debug!(
                "no strategy accepts current conditions, keeping '{}'",
                self.current_strategy_name()
            );
            return;
        }

        let best = scored
            .iter()
            .map(|(_, score)| *score)
            .fold(f64::NEG_INFINITY, f64::max);

        // A tie with the incumbent never causes a switch
        if scored
            .iter()
            .any(|(i, score)| *i == self.current && *score >= best)
        {
            return;
        }

        if let Some((index, score)) = scored.iter().find(|(_, score)| *score >= best) {
            info!(
                "🔄 Strategy switch: {} -> {} (score {:.1})",
                self.current_strategy_name(),
                self.records[*index].strategy.name(),
                score
            );
            self.current = *index;
        }
    }

    /// Scans forward from the slot after the current one so that, with
    /// every strategy eligible, the rotation has period N
    fn advance_round_robin(&mut self, condition: &MarketCondition) {
        let n = self.records.len();
        for step in 1..=n {
            let index = (self.current + step) % n;
            if self.records[index].strategy.should_activate(condition) {
                self.current = index;
                return;
            }
        }
        // Nothing accepts: advance anyway so no strategy pins the rotation
        self.current = (self.current + 1) % n;
    }

    fn score(record: &StrategyRecord, condition: &MarketCondition) -> f64 {
        record.metrics.win_rate * 100.0
            + record.metrics.total_profit * 10.0
            + Self::condition_bonus(record.strategy.name(), condition)
    }

    fn condition_bonus(name: &str, condition: &MarketCondition) -> f64 {
        let mut bonus = 0.0;

        if name == ARBITRAGE && condition.volatility > 5.0 {
            bonus += 50.0;
        }
        if name == TRIANGULAR && condition.volatility < 1.0 {
            bonus += 30.0;
        }
        if condition.volume < 100.0 {
            if name == FIBONACCI {
                bonus += 20.0;
            }
            if name == LIQUIDITY_SPIDER {
                bonus += 30.0;
            }
        }
        let business_hours = (9..=17).contains(&condition.time_of_day);
        if business_hours && name == TRIANGULAR {
            bonus += 25.0;
        }
        if !business_hours && name == ARBITRAGE {
            bonus += 25.0;
        }
        if name == FIBONACCI && condition.competition == CompetitionLevel::High {
            bonus += 40.0;
        }

        bonus
    }

    /// Runs the selected strategy and records the outcome. A thrown error
    /// becomes a synthetic failed result; metrics move either way.
    pub async fn execute_current(&mut self) -> (TradeResult, CycleOutcome) {
        let strategy = Arc::clone(&self.records[self.current].strategy);
        let name = strategy.name();

        let (result, outcome) = match strategy.execute().await {
            Ok(result) if result.success => (result, CycleOutcome::Executed),
            Ok(result) => (result, CycleOutcome::Rejected),
            Err(e) => {
                error!("💥 Strategy '{}' failed: {}", name, e);
                (TradeResult::skipped(name, e.to_string()), CycleOutcome::Error)
            }
        };

        self.records[self.current].metrics.record(&result);
        (result, outcome)
    }

    /// Fixed per-strategy poll interval, used by the caller to pace cycles
    pub fn get_delay_for_strategy(&self) -> Duration {
        match self.current_strategy_name() {
            ARBITRAGE => Duration::from_secs(5),
            TRIANGULAR => Duration::from_secs(8),
            FIBONACCI => Duration::from_secs(12),
            LIQUIDITY_SPIDER => Duration::from_secs(15),
            _ => Duration::from_secs(10),
        }
    }

    pub fn performance_snapshot(&self) -> Vec<(&'static str, PerformanceMetrics)> {
        self.records
            .iter()
            .map(|r| (r.strategy.name(), r.metrics.clone()))
            .collect()
    }

    /// Win rate pooled across every strategy; neutral 0.5 before any trades
    pub fn aggregate_win_rate(&self) -> f64 {
        let trades: u64 = self.records.iter().map(|r| r.metrics.total_trades).sum();
        if trades == 0 {
            return 0.5;
        }
        let wins: u64 = self
            .records
            .iter()
            .map(|r| r.metrics.profitable_trades)
            .sum();
        wins as f64 / trades as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    enum StubOutcome {
        Win(f64),
        Fail(&'static str),
    }

    struct StubStrategy {
        name: &'static str,
        active: Arc<AtomicBool>,
        outcome: StubOutcome,
    }

    impl StubStrategy {
        fn always(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                active: Arc::new(AtomicBool::new(true)),
                outcome: StubOutcome::Win(1.0),
            })
        }

        fn switchable(name: &'static str) -> (Arc<Self>, Arc<AtomicBool>) {
            let active = Arc::new(AtomicBool::new(true));
            let stub = Arc::new(Self {
                name,
                active: active.clone(),
                outcome: StubOutcome::Win(1.0),
            });
            (stub, active)
        }

        fn failing(name: &'static str, message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                active: Arc::new(AtomicBool::new(true)),
                outcome: StubOutcome::Fail(message),
            })
        }
    }

    #[async_trait::async_trait]
    impl Strategy for StubStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn should_activate(&self, _condition: &MarketCondition) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        async fn execute(&self) -> Result<TradeResult, StrategyError> {
            match &self.outcome {
                StubOutcome::Win(profit) => Ok(TradeResult::executed(
                    self.name,
                    "stub-pool".to_string(),
                    *profit,
                    100.0,
                )),
                StubOutcome::Fail(message) => Err(StrategyError::Execution {
                    strategy: self.name.to_string(),
                    reason: message.to_string(),
                }),
            }
        }
    }

    fn neutral_condition() -> MarketCondition {
        MarketCondition {
            volatility: 2.0,
            volume: 500.0,
            competition: CompetitionLevel::Medium,
            time_of_day: 12,
            recent_performance: 0.5,
        }
    }

    #[test]
    fn test_forced_strategy_reported_before_any_tick() {
        let scheduler = StrategyScheduler::new(
            vec![
                StubStrategy::always(TRIANGULAR),
                StubStrategy::always(ARBITRAGE),
            ],
            RotationMode::Score,
            Duration::from_secs(300),
            Some(ARBITRAGE.to_string()),
        )
        .unwrap();

        assert_eq!(scheduler.current_strategy_name(), ARBITRAGE);
    }

    #[test]
    fn test_forced_strategy_bypasses_scoring() {
        let mut scheduler = StrategyScheduler::new(
            vec![
                StubStrategy::always(ARBITRAGE),
                StubStrategy::always(FIBONACCI),
            ],
            RotationMode::Score,
            Duration::ZERO,
            Some(FIBONACCI.to_string()),
        )
        .unwrap();

        // High volatility off-hours would hand arbitrage +75 in bonuses
        let condition = MarketCondition {
            volatility: 8.0,
            time_of_day: 22,
            ..neutral_condition()
        };
        assert_eq!(scheduler.select_strategy(&condition), FIBONACCI);
    }

    #[test]
    fn test_unknown_forced_name_fails_construction() {
        let result = StrategyScheduler::new(
            vec![StubStrategy::always(ARBITRAGE)],
            RotationMode::Score,
            Duration::ZERO,
            Some("momentum".to_string()),
        );
        assert!(matches!(result, Err(StrategyError::Unknown(name)) if name == "momentum"));
    }

    #[test]
    fn test_empty_registration_fails() {
        let result = StrategyScheduler::new(
            Vec::new(),
            RotationMode::Score,
            Duration::ZERO,
            None,
        );
        assert!(matches!(result, Err(StrategyError::NoneRegistered)));
    }

    #[test]
    fn test_round_robin_cycles_with_period_n() {
        let mut scheduler = StrategyScheduler::new(
            vec![
                StubStrategy::always("alpha"),
                StubStrategy::always("beta"),
                StubStrategy::always("gamma"),
            ],
            RotationMode::RoundRobin,
            Duration::ZERO,
            None,
        )
        .unwrap();

        let condition = neutral_condition();
        let sequence: Vec<&str> = (0..6).map(|_| scheduler.select_strategy(&condition)).collect();
        assert_eq!(sequence, ["beta", "gamma", "alpha", "beta", "gamma", "alpha"]);
    }

    #[test]
    fn test_round_robin_skips_ineligible() {
        let (beta, beta_active) = StubStrategy::switchable("beta");
        let mut scheduler = StrategyScheduler::new(
            vec![StubStrategy::always("alpha"), beta, StubStrategy::always("gamma")],
            RotationMode::RoundRobin,
            Duration::ZERO,
            None,
        )
        .unwrap();

        beta_active.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.select_strategy(&neutral_condition()), "gamma");
    }

    #[test]
    fn test_round_robin_advances_when_none_accept() {
        let (alpha, alpha_active) = StubStrategy::switchable("alpha");
        let (beta, beta_active) = StubStrategy::switchable("beta");
        let mut scheduler = StrategyScheduler::new(
            vec![alpha, beta],
            RotationMode::RoundRobin,
            Duration::ZERO,
            None,
        )
        .unwrap();

        alpha_active.store(false, Ordering::SeqCst);
        beta_active.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.select_strategy(&neutral_condition()), "beta");
        assert_eq!(scheduler.select_strategy(&neutral_condition()), "alpha");
    }

    #[test]
    fn test_score_mode_prefers_condition_bonuses() {
        let mut scheduler = StrategyScheduler::new(
            vec![
                StubStrategy::always(TRIANGULAR),
                StubStrategy::always(ARBITRAGE),
            ],
            RotationMode::Score,
            Duration::ZERO,
            None,
        )
        .unwrap();

        // Volatility 6 plus an off-hours tick favors arbitrage by +75
        let condition = MarketCondition {
            volatility: 6.0,
            time_of_day: 20,
            ..neutral_condition()
        };
        assert_eq!(scheduler.select_strategy(&condition), ARBITRAGE);
    }

    #[test]
    fn test_score_tie_retains_incumbent() {
        let mut scheduler = StrategyScheduler::new(
            vec![StubStrategy::always("alpha"), StubStrategy::always("beta")],
            RotationMode::Score,
            Duration::ZERO,
            None,
        )
        .unwrap();

        // No bonus applies to either custom name, so both score zero
        assert_eq!(scheduler.select_strategy(&neutral_condition()), "alpha");
        assert_eq!(scheduler.select_strategy(&neutral_condition()), "alpha");
    }

    #[test]
    fn test_switch_interval_gates_reselection() {
        let mut scheduler = StrategyScheduler::new(
            vec![
                StubStrategy::always(TRIANGULAR),
                StubStrategy::always(ARBITRAGE),
            ],
            RotationMode::Score,
            Duration::from_secs(300),
            None,
        )
        .unwrap();

        let calm = MarketCondition {
            volatility: 0.5,
            time_of_day: 12,
            ..neutral_condition()
        };
        assert_eq!(scheduler.select_strategy(&calm), TRIANGULAR);

        // Conditions now favor arbitrage, but the interval has not elapsed
        let wild = MarketCondition {
            volatility: 9.0,
            time_of_day: 22,
            ..neutral_condition()
        };
        assert_eq!(scheduler.select_strategy(&wild), TRIANGULAR);
    }

    #[tokio::test]
    async fn test_execution_error_becomes_failed_result() {
        let mut scheduler = StrategyScheduler::new(
            vec![StubStrategy::failing(ARBITRAGE, "provider exploded")],
            RotationMode::Score,
            Duration::ZERO,
            None,
        )
        .unwrap();

        let (result, outcome) = scheduler.execute_current().await;
        assert!(!result.success);
        assert_eq!(outcome, CycleOutcome::Error);
        assert!(result.error.as_ref().unwrap().contains("provider exploded"));

        let snapshot = scheduler.performance_snapshot();
        assert_eq!(snapshot[0].1.total_trades, 1);
        assert_eq!(snapshot[0].1.profitable_trades, 0);
    }

    #[tokio::test]
    async fn test_metrics_and_aggregate_win_rate() {
        let mut scheduler = StrategyScheduler::new(
            vec![StubStrategy::always(ARBITRAGE)],
            RotationMode::Score,
            Duration::ZERO,
            None,
        )
        .unwrap();

        assert_eq!(scheduler.aggregate_win_rate(), 0.5);

        let (_, outcome) = scheduler.execute_current().await;
        assert_eq!(outcome, CycleOutcome::Executed);
        assert_eq!(scheduler.aggregate_win_rate(), 1.0);

        let snapshot = scheduler.performance_snapshot();
        assert_eq!(snapshot[0].1.total_trades, 1);
        assert!((snapshot[0].1.total_profit - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_delay_lookup_table() {
        let scheduler = StrategyScheduler::new(
            vec![StubStrategy::always(FIBONACCI)],
            RotationMode::Score,
            Duration::ZERO,
            None,
        )
        .unwrap();
        assert_eq!(scheduler.get_delay_for_strategy(), Duration::from_secs(12));
    }
}
