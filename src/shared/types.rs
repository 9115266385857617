//! Core value types shared across the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price quote, immutable once fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub fee_tier: u32,
    pub output_amount: f64,
    pub liquidity: Option<f64>,
    pub tick: Option<i32>,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Output per unit of input
    pub fn implied_price(&self) -> f64 {
        if self.amount_in > 0.0 {
            self.output_amount / self.amount_in
        } else {
            0.0
        }
    }

    pub fn pair_label(&self) -> String {
        format!("{}/{}", self.token_in, self.token_out)
    }
}

/// A quote request as issued by strategies and the batch API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub fee_tier: Option<u32>,
}

impl QuoteRequest {
    pub fn new(token_in: impl Into<String>, token_out: impl Into<String>, amount_in: f64) -> Self {
        Self {
            token_in: token_in.into(),
            token_out: token_out.into(),
            amount_in,
            fee_tier: None,
        }
    }

    /// Cache identity: pair plus exact input amount
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.token_in, self.token_out, self.amount_in)
    }

    pub fn pair_key(&self) -> String {
        format!("{}/{}", self.token_in, self.token_out)
    }
}

/// A quote plus its cache provenance
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedQuote {
    pub quote: Quote,
    pub from_cache: bool,
}

/// Competing-searcher pressure on the venues we trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
}

impl CompetitionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionLevel::Low => "LOW",
            CompetitionLevel::Medium => "MEDIUM",
            CompetitionLevel::High => "HIGH",
        }
    }
}

/// Point-in-time market snapshot consumed by the scheduler and tuner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCondition {
    /// Recent price dispersion, in percent
    pub volatility: f64,
    /// Rolling traded volume in base-token units
    pub volume: f64,
    pub competition: CompetitionLevel,
    /// UTC hour, 0-23
    pub time_of_day: u32,
    /// Aggregate win rate over recent cycles, 0..1
    pub recent_performance: f64,
}

impl MarketCondition {
    /// Fallback applied when the condition feed is unavailable:
    /// low-to-medium volatility, medium volume, medium competition.
    pub fn safe_default() -> Self {
        use chrono::Timelike;
        Self {
            volatility: 2.0,
            volume: 500.0,
            competition: CompetitionLevel::Medium,
            time_of_day: Utc::now().hour(),
            recent_performance: 0.5,
        }
    }
}

/// Outcome of one strategy execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub success: bool,
    pub profit: f64,
    pub volume: f64,
    pub pool: String,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl TradeResult {
    pub fn executed(strategy: &str, pool: String, profit: f64, volume: f64) -> Self {
        Self {
            success: true,
            profit,
            volume,
            pool,
            strategy: strategy.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn skipped(strategy: &str, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            profit: 0.0,
            volume: 0.0,
            pool: String::new(),
            strategy: strategy.to_string(),
            timestamp: Utc::now(),
            error: Some(reason.into()),
        }
    }
}

/// Terminal classification of one scheduling cycle. `Rejected` covers every
/// unsuccessful-but-expected outcome (no opportunity, risk gate, thin books);
/// `Error` is reserved for strategies that returned a genuine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Executed,
    Rejected,
    Error,
}

/// Rolling per-strategy performance record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: u64,
    pub profitable_trades: u64,
    pub total_volume: f64,
    pub total_profit: f64,
    pub win_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            total_trades: 0,
            profitable_trades: 0,
            total_volume: 0.0,
            total_profit: 0.0,
            win_rate: 0.0,
            last_updated: Utc::now(),
        }
    }

    /// Applied after every execution attempt. Trade count and volume move
    /// unconditionally; profit and wins only on a successful result with
    /// positive profit.
    pub fn record(&mut self, result: &TradeResult) {
        self.total_trades += 1;
        self.total_volume += result.volume;
        if result.success && result.profit > 0.0 {
            self.profitable_trades += 1;
            self.total_profit += result.profit;
        }
        self.win_rate = self.profitable_trades as f64 / self.total_trades as f64;
        self.last_updated = Utc::now();
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// An open position tracked by the risk ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub amount: f64,
    pub avg_price: f64,
    pub unrealized_pnl: f64,
    pub updated_at: DateTime<Utc>,
}

impl PositionInfo {
    /// Notional value at the entry price, used for exposure accounting
    pub fn notional(&self) -> f64 {
        (self.amount * self.avg_price).abs()
    }

    /// Unrealized loss as a percentage of the entry notional; zero when
    /// the position is flat or in profit.
    pub fn loss_pct(&self) -> f64 {
        let notional = self.notional();
        if notional > 0.0 && self.unrealized_pnl < 0.0 {
            -self.unrealized_pnl / notional * 100.0
        } else {
            0.0
        }
    }
}

/// Configurable limits enforced by the risk manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub max_daily_loss: f64,
    pub max_position_size: f64,
    pub max_portfolio_exposure: f64,
    pub max_slippage_bps: u32,
    pub max_concurrent_trades: u32,
    pub stop_loss_threshold_pct: f64,
    pub daily_volume_limit: f64,
    pub max_drawdown_pct: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss: 100.0,
            max_position_size: 1_000.0,
            max_portfolio_exposure: 5_000.0,
            max_slippage_bps: 100,
            max_concurrent_trades: 3,
            stop_loss_threshold_pct: 5.0,
            daily_volume_limit: 50_000.0,
            max_drawdown_pct: 10.0,
        }
    }
}

/// Verdict for one prospective trade; produced fresh per evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeDecision {
    pub allowed: bool,
    pub reason: String,
    pub adjusted_amount: Option<f64>,
}

impl TradeDecision {
    pub fn allow(amount: f64, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            adjusted_amount: Some(amount),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            adjusted_amount: None,
        }
    }
}

/// A token pair and size configured for trading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPair {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
}

impl TradingPair {
    pub fn label(&self) -> String {
        format!("{}/{}", self.token_in, self.token_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record_rules() {
        let mut metrics = PerformanceMetrics::new();

        let win = TradeResult::executed("arbitrage", "WETH/USDC@500".into(), 5.0, 100.0);
        metrics.record(&win);
        assert_eq!(metrics.total_trades, 1);
        assert_eq!(metrics.profitable_trades, 1);
        assert_eq!(metrics.total_profit, 5.0);
        assert_eq!(metrics.win_rate, 1.0);

        // Failed attempt still counts as a trade, never as a win
        let miss = TradeResult::skipped("arbitrage", "no viable path");
        metrics.record(&miss);
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.profitable_trades, 1);
        assert_eq!(metrics.total_profit, 5.0);
        assert_eq!(metrics.win_rate, 0.5);

        // Successful result with non-positive profit does not count as a win
        let flat = TradeResult::executed("arbitrage", "WETH/USDC@500".into(), 0.0, 50.0);
        metrics.record(&flat);
        assert_eq!(metrics.profitable_trades, 1);
        assert_eq!(metrics.total_volume, 150.0);
    }

    #[test]
    fn test_position_loss_pct() {
        let position = PositionInfo {
            amount: 10.0,
            avg_price: 100.0,
            unrealized_pnl: -60.0,
            updated_at: Utc::now(),
        };
        assert!((position.loss_pct() - 6.0).abs() < 1e-9);

        let winner = PositionInfo {
            amount: 10.0,
            avg_price: 100.0,
            unrealized_pnl: 40.0,
            updated_at: Utc::now(),
        };
        assert_eq!(winner.loss_pct(), 0.0);
    }

    #[test]
    fn test_cache_key_includes_amount() {
        let a = QuoteRequest::new("WETH", "USDC", 1.0);
        let b = QuoteRequest::new("WETH", "USDC", 2.0);
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.pair_key(), b.pair_key());
    }

    #[test]
    fn test_competition_level_serde() {
        let json = serde_json::to_string(&CompetitionLevel::High).unwrap();
        assert_eq!(json, "\"HIGH\"");
        let parsed: CompetitionLevel = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(parsed, CompetitionLevel::Low);
    }
}
