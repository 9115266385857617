//! Built-in trading strategies
//!
//! All four trade on paper: fills settle into the risk ledger at quoted
//! prices, net of the slippage protection floor. Each strategy asks the
//! risk manager before committing and reports rejections as unsuccessful
//! results rather than errors.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    SharedConditions, Strategy, ARBITRAGE, FIBONACCI, LIQUIDITY_SPIDER, TRIANGULAR,
};
use crate::arbitrage::{ArbitrageEvaluator, PathCandidate};
use crate::math;
use crate::quotes::optimizer::QuoteOptimizer;
use crate::risk::RiskManager;
use crate::shared::errors::{QuoteError, StrategyError};
use crate::shared::types::{CompetitionLevel, MarketCondition, Quote, TradeResult, TradingPair};
use crate::tuner::ConfigTuner;

/// Position-size multipliers walked on a win streak
const LADDER: [f64; 7] = [1.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0];

fn urgency_for(competition: CompetitionLevel) -> f64 {
    match competition {
        CompetitionLevel::Low => 0.8,
        CompetitionLevel::Medium => 1.0,
        CompetitionLevel::High => 1.3,
    }
}

/// Round-trip arbitrage across the configured pairs
pub struct ArbitrageStrategy {
    evaluator: Arc<ArbitrageEvaluator>,
    optimizer: Arc<QuoteOptimizer>,
    risk: Arc<RiskManager>,
    tuner: Arc<ConfigTuner>,
    conditions: SharedConditions,
    pairs: Vec<TradingPair>,
}

impl ArbitrageStrategy {
    pub fn new(
        evaluator: Arc<ArbitrageEvaluator>,
        optimizer: Arc<QuoteOptimizer>,
        risk: Arc<RiskManager>,
        tuner: Arc<ConfigTuner>,
        conditions: SharedConditions,
        pairs: Vec<TradingPair>,
    ) -> Self {
        Self {
            evaluator,
            optimizer,
            risk,
            tuner,
            conditions,
            pairs,
        }
    }
}

#[async_trait]
impl Strategy for ArbitrageStrategy {
    fn name(&self) -> &'static str {
        ARBITRAGE
    }

    fn should_activate(&self, condition: &MarketCondition) -> bool {
        // Needs price movement to produce divergence
        condition.volatility >= 0.5
    }

    async fn execute(&self) -> Result<TradeResult, StrategyError> {
        let params = self.tuner.current().await;
        let condition = self.conditions.read().await.clone();

        let candidates: Vec<PathCandidate> = self
            .pairs
            .iter()
            .map(|pair| {
                PathCandidate::new(
                    &pair.token_in,
                    &pair.token_out,
                    pair.amount_in.min(params.max_trade_size),
                )
            })
            .collect();
        if candidates.is_empty() {
            return Ok(TradeResult::skipped(ARBITRAGE, "no trading pairs configured"));
        }

        let paths = self.evaluator.evaluate_paths(&candidates).await;
        let best = match paths
            .into_iter()
            .find(|path| path.viable && path.profit_bps >= params.min_profit_bps)
        {
            Some(path) => path,
            None => return Ok(TradeResult::skipped(ARBITRAGE, "no viable arbitrage path")),
        };
        let forward = match &best.forward_quote {
            Some(quote) => quote.clone(),
            None => return Ok(TradeResult::skipped(ARBITRAGE, "path missing forward quote")),
        };

        let slippage_bps = self.optimizer.calculate_optimal_slippage(
            params.slippage_tolerance_bps,
            condition.volatility,
            forward.liquidity.unwrap_or(1.0),
            urgency_for(condition.competition),
        );

        let size = match self
            .risk
            .ensure_allowed(ARBITRAGE, &best.token_a, &best.token_b, best.amount_in, slippage_bps)
            .await
        {
            Ok(size) => size,
            Err(e) => return Ok(TradeResult::skipped(ARBITRAGE, e.to_string())),
        };

        let expected_out = size * (1.0 + best.profit_bps as f64 / 10_000.0);
        let guaranteed_out = math::min_out(expected_out, slippage_bps);
        if guaranteed_out <= size {
            return Ok(TradeResult::skipped(
                ARBITRAGE,
                "round trip unprofitable after slippage protection",
            ));
        }

        self.risk.begin_trade().await;
        let profit = guaranteed_out - size;
        self.risk.complete_trade(profit, size).await;

        let pool = format!("{}@{}", best.pair_label(), forward.fee_tier);
        info!("💰 Arbitrage filled on {}: {:+.4} on size {:.2}", pool, profit, size);
        Ok(TradeResult::executed(ARBITRAGE, pool, profit, size))
    }
}

/// Three-legged cycle through a fixed token route
pub struct TriangularStrategy {
    optimizer: Arc<QuoteOptimizer>,
    risk: Arc<RiskManager>,
    tuner: Arc<ConfigTuner>,
    conditions: SharedConditions,
    route: [String; 3],
    amount_in: f64,
}

impl TriangularStrategy {
    pub fn new(
        optimizer: Arc<QuoteOptimizer>,
        risk: Arc<RiskManager>,
        tuner: Arc<ConfigTuner>,
        conditions: SharedConditions,
        route: [String; 3],
        amount_in: f64,
    ) -> Self {
        Self {
            optimizer,
            risk,
            tuner,
            conditions,
            route,
            amount_in,
        }
    }

    /// One leg of the cycle. `None` means the leg has no liquidity, which
    /// is an expected quiet-market outcome rather than a failure.
    async fn leg(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
    ) -> Result<Option<Quote>, StrategyError> {
        match self
            .optimizer
            .get_optimized_quote(token_in, token_out, amount_in, None)
            .await
        {
            Ok(optimized) => Ok(Some(optimized.quote)),
            Err(QuoteError::Unavailable { .. }) | Err(QuoteError::Provider(_)) => Ok(None),
            Err(e) => Err(StrategyError::Execution {
                strategy: TRIANGULAR.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Strategy for TriangularStrategy {
    fn name(&self) -> &'static str {
        TRIANGULAR
    }

    fn should_activate(&self, condition: &MarketCondition) -> bool {
        // Three sequential legs want a calm book
        condition.volatility <= 3.0
    }

    async fn execute(&self) -> Result<TradeResult, StrategyError> {
        let params = self.tuner.current().await;
        let condition = self.conditions.read().await.clone();
        let [a, b, c] = &self.route;
        let amount = self.amount_in.min(params.max_trade_size);

        let leg1 = match self.leg(a, b, amount).await? {
            Some(quote) => quote,
            None => return Ok(TradeResult::skipped(TRIANGULAR, "first leg has no liquidity")),
        };
        let leg2 = match self.leg(b, c, leg1.output_amount).await? {
            Some(quote) => quote,
            None => return Ok(TradeResult::skipped(TRIANGULAR, "second leg has no liquidity")),
        };
        let leg3 = match self.leg(c, a, leg2.output_amount).await? {
            Some(quote) => quote,
            None => return Ok(TradeResult::skipped(TRIANGULAR, "third leg has no liquidity")),
        };

        let gain = math::round_trip_gain(amount, leg3.output_amount);
        let profit_bps = math::profit_bps(leg3.output_amount - amount, amount);
        if profit_bps < params.min_profit_bps {
            debug!(
                "triangle {}>{}>{} at {} bps, below the {} bps target",
                a, b, c, profit_bps, params.min_profit_bps
            );
            return Ok(TradeResult::skipped(TRIANGULAR, "cycle below profit target"));
        }

        let slippage_bps = self.optimizer.calculate_optimal_slippage(
            params.slippage_tolerance_bps,
            condition.volatility,
            leg1.liquidity.unwrap_or(1.0),
            urgency_for(condition.competition),
        );

        let size = match self
            .risk
            .ensure_allowed(TRIANGULAR, a, b, amount, slippage_bps)
            .await
        {
            Ok(size) => size,
            Err(e) => return Ok(TradeResult::skipped(TRIANGULAR, e.to_string())),
        };

        let expected_out = size * (1.0 + gain);
        let guaranteed_out = math::min_out(expected_out, slippage_bps);
        if guaranteed_out <= size {
            return Ok(TradeResult::skipped(
                TRIANGULAR,
                "cycle unprofitable after slippage protection",
            ));
        }

        self.risk.begin_trade().await;
        let profit = guaranteed_out - size;
        self.risk.complete_trade(profit, size).await;

        let pool = format!("{}>{}>{}", a, b, c);
        info!("🔺 Triangle filled on {}: {:+.4} on size {:.2}", pool, profit, size);
        Ok(TradeResult::executed(TRIANGULAR, pool, profit, size))
    }
}

/// Scales position size along a Fibonacci ladder, advancing on wins and
/// resetting to the bottom on any loss
pub struct FibonacciStrategy {
    optimizer: Arc<QuoteOptimizer>,
    risk: Arc<RiskManager>,
    tuner: Arc<ConfigTuner>,
    conditions: SharedConditions,
    pair: TradingPair,
    level: Mutex<usize>,
}

impl FibonacciStrategy {
    pub fn new(
        optimizer: Arc<QuoteOptimizer>,
        risk: Arc<RiskManager>,
        tuner: Arc<ConfigTuner>,
        conditions: SharedConditions,
        pair: TradingPair,
    ) -> Self {
        Self {
            optimizer,
            risk,
            tuner,
            conditions,
            pair,
            level: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Strategy for FibonacciStrategy {
    fn name(&self) -> &'static str {
        FIBONACCI
    }

    fn should_activate(&self, condition: &MarketCondition) -> bool {
        // Laddering works quiet books where fills do not move the price
        condition.volume <= 1_000.0
    }

    async fn execute(&self) -> Result<TradeResult, StrategyError> {
        let params = self.tuner.current().await;
        let condition = self.conditions.read().await.clone();
        let multiplier = LADDER[*self.level.lock().await];
        let requested = (self.pair.amount_in * multiplier).min(params.max_trade_size);

        let entry = match self
            .optimizer
            .get_optimized_quote(&self.pair.token_in, &self.pair.token_out, requested, None)
            .await
        {
            Ok(optimized) => optimized.quote,
            Err(QuoteError::Unavailable { .. }) | Err(QuoteError::Provider(_)) => {
                return Ok(TradeResult::skipped(FIBONACCI, "entry leg has no liquidity"))
            }
            Err(e) => {
                return Err(StrategyError::Execution {
                    strategy: FIBONACCI.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let slippage_bps = self.optimizer.calculate_optimal_slippage(
            params.slippage_tolerance_bps,
            condition.volatility,
            entry.liquidity.unwrap_or(1.0),
            urgency_for(condition.competition),
        );

        let size = match self
            .risk
            .ensure_allowed(
                FIBONACCI,
                &self.pair.token_in,
                &self.pair.token_out,
                requested,
                slippage_bps,
            )
            .await
        {
            Ok(size) => size,
            Err(e) => return Ok(TradeResult::skipped(FIBONACCI, e.to_string())),
        };

        self.risk.begin_trade().await;

        // Paper entry at the quoted price
        let entry_price = entry.amount_in / entry.output_amount;
        let acquired = size / entry_price;
        self.risk
            .update_position(&self.pair.token_out, acquired, entry_price, true)
            .await;

        // Same-cycle paper exit
        let exit = match self
            .optimizer
            .get_optimized_quote(&self.pair.token_out, &self.pair.token_in, acquired, None)
            .await
        {
            Ok(optimized) => optimized.quote,
            Err(e) => {
                self.risk
                    .update_position(&self.pair.token_out, acquired, entry_price, false)
                    .await;
                self.risk.complete_trade(0.0, 0.0).await;
                return Ok(TradeResult::skipped(
                    FIBONACCI,
                    format!("exit leg unquotable, position unwound: {}", e),
                ));
            }
        };

        let exit_price = exit.output_amount / acquired;
        self.risk
            .update_position(&self.pair.token_out, acquired, exit_price, false)
            .await;

        let profit = exit.output_amount - size;
        self.risk.complete_trade(profit, size).await;

        let mut level = self.level.lock().await;
        *level = if profit > 0.0 {
            (*level + 1).min(LADDER.len() - 1)
        } else {
            0
        };
        info!(
            "📐 Fibonacci {} on {}: {:+.4}, ladder level now {}",
            if profit > 0.0 { "win" } else { "loss" },
            self.pair.label(),
            profit,
            *level
        );

        let pool = format!("{}@{}", self.pair.label(), entry.fee_tier);
        Ok(TradeResult::executed(FIBONACCI, pool, profit, size))
    }
}

/// Sweeps every configured pair's fee tiers looking for cross-pool price
/// divergence, and keeps open-position marks fresh along the way
pub struct LiquiditySpiderStrategy {
    optimizer: Arc<QuoteOptimizer>,
    risk: Arc<RiskManager>,
    tuner: Arc<ConfigTuner>,
    conditions: SharedConditions,
    pairs: Vec<TradingPair>,
}

impl LiquiditySpiderStrategy {
    pub fn new(
        optimizer: Arc<QuoteOptimizer>,
        risk: Arc<RiskManager>,
        tuner: Arc<ConfigTuner>,
        conditions: SharedConditions,
        pairs: Vec<TradingPair>,
    ) -> Self {
        Self {
            optimizer,
            risk,
            tuner,
            conditions,
            pairs,
        }
    }
}

#[async_trait]
impl Strategy for LiquiditySpiderStrategy {
    fn name(&self) -> &'static str {
        LIQUIDITY_SPIDER
    }

    fn should_activate(&self, _condition: &MarketCondition) -> bool {
        // Always willing to scan; keeps every rotation mode moving
        true
    }

    async fn execute(&self) -> Result<TradeResult, StrategyError> {
        let params = self.tuner.current().await;
        let condition = self.conditions.read().await.clone();

        for pair in &self.pairs {
            let amount = pair.amount_in.min(params.max_trade_size);
            let probes = self
                .optimizer
                .probe_fee_tiers(&pair.token_in, &pair.token_out, amount)
                .await;

            // Refresh the mark on any open position in this pair's token
            let best_quote = probes
                .iter()
                .filter_map(|probe| probe.outcome.as_ref().ok())
                .max_by(|a, b| a.output_amount.total_cmp(&b.output_amount));
            if let Some(best) = best_quote {
                if self.risk.position(&pair.token_out).await.is_some() {
                    let mark = best.amount_in / best.output_amount;
                    self.risk.mark_position(&pair.token_out, mark).await;
                }
            }

            let spread = match ArbitrageEvaluator::cross_pool_spread(&probes, amount) {
                Some(spread) => spread,
                None => continue,
            };
            if (spread.gross_profit_bps.round() as i64) < params.min_profit_bps {
                debug!(
                    "{} spread {:.0} bps below the {} bps target",
                    pair.label(),
                    spread.gross_profit_bps,
                    params.min_profit_bps
                );
                continue;
            }

            let buy_side_liquidity = probes
                .iter()
                .filter_map(|probe| probe.outcome.as_ref().ok())
                .find(|quote| quote.fee_tier == spread.buy_tier)
                .and_then(|quote| quote.liquidity)
                .unwrap_or(1.0);
            let slippage_bps = self.optimizer.calculate_optimal_slippage(
                params.slippage_tolerance_bps,
                condition.volatility,
                buy_side_liquidity,
                urgency_for(condition.competition),
            );

            let size = match self
                .risk
                .ensure_allowed(
                    LIQUIDITY_SPIDER,
                    &pair.token_in,
                    &pair.token_out,
                    amount,
                    slippage_bps,
                )
                .await
            {
                Ok(size) => size,
                Err(e) => return Ok(TradeResult::skipped(LIQUIDITY_SPIDER, e.to_string())),
            };

            let expected_out = size * (1.0 + spread.gross_profit_bps / 10_000.0);
            let guaranteed_out = math::min_out(expected_out, slippage_bps);
            if guaranteed_out <= size {
                continue;
            }

            self.risk.begin_trade().await;
            let profit = guaranteed_out - size;
            self.risk.complete_trade(profit, size).await;

            let pool = format!("{} {}->{}", pair.label(), spread.buy_tier, spread.sell_tier);
            info!(
                "🕸️ Spider filled on {}: {:+.4} across {:.2}% divergence",
                pool, profit, spread.divergence_pct
            );
            return Ok(TradeResult::executed(LIQUIDITY_SPIDER, pool, profit, size));
        }

        Ok(TradeResult::skipped(
            LIQUIDITY_SPIDER,
            "no cross-pool divergence found",
        ))
    }
}
