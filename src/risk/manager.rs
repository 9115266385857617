//! Position ledger and risk gating
//!
//! Every prospective trade passes through a fixed sequence of gates that
//! short-circuits on the first failure, so each rejection names exactly one
//! rule. The ledger tracks open positions, active trade count, and daily
//! balance baselines; the first check on a new calendar day resets the
//! daily counters.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::math;
use crate::shared::errors::RiskError;
use crate::shared::types::{PositionInfo, RiskLimits, TradeDecision};

/// Composite risk score above which all trades are blocked
pub const MAX_RISK_SCORE: f64 = 75.0;

/// Closed-trade P&L samples retained for the volatility component
const PNL_WINDOW: usize = 50;

/// Executes the closing trade when a stop-loss fires. The ledger entry is
/// dropped even if the close fails, so the caller sees the failure only in
/// the logs.
#[async_trait]
pub trait PositionCloser: Send + Sync {
    async fn close(&self, token: &str, amount: f64, entry_price: f64) -> Result<(), RiskError>;
}

/// Ledger-only closer for paper trading
pub struct PaperCloser;

#[async_trait]
impl PositionCloser for PaperCloser {
    async fn close(&self, token: &str, amount: f64, entry_price: f64) -> Result<(), RiskError> {
        info!(
            "📄 Paper close: {:.6} {} from entry {:.6}",
            amount, token, entry_price
        );
        Ok(())
    }
}

struct RiskState {
    positions: HashMap<String, PositionInfo>,
    active_trades: u32,
    current_balance: f64,
    daily_start_balance: f64,
    last_reset_date: NaiveDate,
    daily_volume: f64,
    recent_pnls: VecDeque<f64>,
    emergency_stop: Option<String>,
}

/// Snapshot of ledger health, emitted once per cycle
#[derive(Debug, Clone, Serialize)]
pub struct RiskMetrics {
    pub current_balance: f64,
    pub daily_pnl: f64,
    pub current_drawdown_pct: f64,
    pub total_exposure: f64,
    pub active_trades: u32,
    pub open_positions: usize,
    pub risk_score: f64,
    pub emergency_stop: bool,
}

pub struct RiskManager {
    limits: RiskLimits,
    closer: Arc<dyn PositionCloser>,
    state: RwLock<RiskState>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits, starting_balance: f64, closer: Arc<dyn PositionCloser>) -> Self {
        Self {
            limits,
            closer,
            state: RwLock::new(RiskState {
                positions: HashMap::new(),
                active_trades: 0,
                current_balance: starting_balance,
                daily_start_balance: starting_balance,
                last_reset_date: Utc::now().date_naive(),
                daily_volume: 0.0,
                recent_pnls: VecDeque::new(),
                emergency_stop: None,
            }),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Runs the gates in priority order and returns the verdict for one
    /// prospective trade. A pass carries the adjusted position size.
    pub async fn check_trade_allowed(
        &self,
        strategy: &str,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
        expected_slippage_bps: u32,
    ) -> TradeDecision {
        let mut state = self.state.write().await;
        Self::apply_daily_reset(&mut state, Utc::now().date_naive());

        match self.run_gates(&state, token_out, amount_in, expected_slippage_bps) {
            Ok(adjusted) => TradeDecision::allow(
                adjusted,
                format!(
                    "{} approved for {} -> {} at size {:.4}",
                    strategy, token_in, token_out, adjusted
                ),
            ),
            Err((rule, reason)) => {
                warn!("🛑 {} trade blocked by {}: {}", strategy, rule, reason);
                TradeDecision::reject(reason)
            }
        }
    }

    /// Like `check_trade_allowed`, but surfaces a rejection as a typed
    /// error carrying the rule that fired.
    pub async fn ensure_allowed(
        &self,
        strategy: &str,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
        expected_slippage_bps: u32,
    ) -> Result<f64, RiskError> {
        let mut state = self.state.write().await;
        Self::apply_daily_reset(&mut state, Utc::now().date_naive());

        self.run_gates(&state, token_out, amount_in, expected_slippage_bps)
            .map_err(|(rule, reason)| {
                warn!("🛑 {} trade blocked by {}: {}", strategy, rule, reason);
                RiskError::Rejected { rule, reason }
            })
    }

    fn run_gates(
        &self,
        state: &RiskState,
        token_out: &str,
        amount_in: f64,
        expected_slippage_bps: u32,
    ) -> Result<f64, (&'static str, String)> {
        if let Some(cause) = &state.emergency_stop {
            return Err(("emergency_stop", format!("emergency stop active: {}", cause)));
        }

        let daily_pnl = state.current_balance - state.daily_start_balance;
        if daily_pnl <= -self.limits.max_daily_loss {
            return Err((
                "daily_loss",
                format!(
                    "daily loss limit reached: P&L {:.2} vs limit -{:.2}",
                    daily_pnl, self.limits.max_daily_loss
                ),
            ));
        }

        let drawdown = Self::drawdown_pct(state);
        if drawdown >= self.limits.max_drawdown_pct {
            return Err((
                "drawdown",
                format!(
                    "drawdown {:.2}% at or above maximum {:.2}%",
                    drawdown, self.limits.max_drawdown_pct
                ),
            ));
        }

        if expected_slippage_bps > self.limits.max_slippage_bps {
            return Err((
                "slippage",
                format!(
                    "expected slippage {} bps exceeds maximum {} bps",
                    expected_slippage_bps, self.limits.max_slippage_bps
                ),
            ));
        }

        if state.active_trades >= self.limits.max_concurrent_trades {
            return Err((
                "concurrency",
                format!(
                    "{} trades already active, maximum is {}",
                    state.active_trades, self.limits.max_concurrent_trades
                ),
            ));
        }

        let adjusted = Self::position_size(state, &self.limits, amount_in, token_out);
        if adjusted <= 0.0 {
            return Err((
                "zero_size",
                format!("position size for {} resolves to zero", token_out),
            ));
        }

        let exposure = Self::total_exposure(state);
        if exposure + adjusted > self.limits.max_portfolio_exposure {
            return Err((
                "exposure",
                format!(
                    "exposure {:.2} + size {:.2} would exceed portfolio limit {:.2}",
                    exposure, adjusted, self.limits.max_portfolio_exposure
                ),
            ));
        }

        let score = Self::risk_score(state, &self.limits);
        if score > MAX_RISK_SCORE {
            return Err((
                "risk_score",
                format!("risk score {:.1} above maximum {:.0}", score, MAX_RISK_SCORE),
            ));
        }

        Ok(adjusted)
    }

    /// Shrinks a requested size by the current risk score (at most 50%),
    /// then clamps it to the position limit, the remaining portfolio
    /// exposure, and the remaining allowance for an existing position in
    /// the same token. Zero means "do not trade".
    pub async fn calculate_optimal_position_size(&self, requested: f64, token: &str) -> f64 {
        let state = self.state.read().await;
        Self::position_size(&state, &self.limits, requested, token)
    }

    fn position_size(state: &RiskState, limits: &RiskLimits, requested: f64, token: &str) -> f64 {
        let score = Self::risk_score(state, limits);
        let mut size = requested * (1.0 - score / 200.0);

        size = size.min(limits.max_position_size);

        let remaining_exposure =
            (limits.max_portfolio_exposure - Self::total_exposure(state)).max(0.0);
        size = size.min(remaining_exposure);

        if let Some(position) = state.positions.get(token) {
            let allowance = (limits.max_position_size - position.notional()).max(0.0);
            size = size.min(allowance);
        }

        size.max(0.0)
    }

    pub async fn get_risk_metrics(&self) -> RiskMetrics {
        let mut state = self.state.write().await;
        Self::apply_daily_reset(&mut state, Utc::now().date_naive());

        RiskMetrics {
            current_balance: state.current_balance,
            daily_pnl: state.current_balance - state.daily_start_balance,
            current_drawdown_pct: Self::drawdown_pct(&state),
            total_exposure: Self::total_exposure(&state),
            active_trades: state.active_trades,
            open_positions: state.positions.len(),
            risk_score: Self::risk_score(&state, &self.limits),
            emergency_stop: state.emergency_stop.is_some(),
        }
    }

    /// Adds to or reduces a position. Adds recompute the weighted-average
    /// entry price; reductions keep it and shrink the size, deleting the
    /// entry at zero. Stop-losses are checked after every update.
    pub async fn update_position(&self, token: &str, amount: f64, price: f64, is_add: bool) {
        {
            let mut state = self.state.write().await;
            match state.positions.get_mut(token) {
                Some(position) if is_add => {
                    let new_amount = position.amount + amount;
                    if new_amount > 0.0 {
                        position.avg_price = math::weighted_avg_price(
                            position.amount,
                            position.avg_price,
                            amount,
                            price,
                        );
                        position.amount = new_amount;
                        position.unrealized_pnl = (price - position.avg_price) * new_amount;
                        position.updated_at = Utc::now();
                    }
                }
                Some(position) => {
                    let new_amount = (position.amount - amount).max(0.0);
                    if new_amount <= f64::EPSILON {
                        state.positions.remove(token);
                    } else {
                        position.amount = new_amount;
                        position.unrealized_pnl = (price - position.avg_price) * new_amount;
                        position.updated_at = Utc::now();
                    }
                }
                None if is_add && amount > 0.0 => {
                    state.positions.insert(
                        token.to_string(),
                        PositionInfo {
                            amount,
                            avg_price: price,
                            unrealized_pnl: 0.0,
                            updated_at: Utc::now(),
                        },
                    );
                }
                None => {}
            }
        }

        self.check_stop_losses().await;
    }

    /// Refreshes a position's unrealized P&L against a fresh price and
    /// checks its stop-loss.
    pub async fn mark_position(&self, token: &str, price: f64) {
        {
            let mut state = self.state.write().await;
            if let Some(position) = state.positions.get_mut(token) {
                position.unrealized_pnl = (price - position.avg_price) * position.amount;
                position.updated_at = Utc::now();
            }
        }

        self.check_stop_losses().await;
    }

    /// Force-closes every position whose unrealized loss exceeds the
    /// stop-loss threshold. Returns the number of positions closed.
    pub async fn check_stop_losses(&self) -> usize {
        let breached: Vec<(String, PositionInfo)> = {
            let state = self.state.read().await;
            state
                .positions
                .iter()
                .filter(|(_, position)| position.loss_pct() > self.limits.stop_loss_threshold_pct)
                .map(|(token, position)| (token.clone(), position.clone()))
                .collect()
        };

        for (token, position) in &breached {
            warn!(
                "🛑 Stop-loss for {}: {:.2}% loss on {:.6} units, force closing",
                token,
                position.loss_pct(),
                position.amount
            );
            if let Err(e) = self
                .closer
                .close(token, position.amount, position.avg_price)
                .await
            {
                error!(
                    "stop-loss close for {} failed, dropping ledger entry anyway: {}",
                    token, e
                );
            }

            let mut state = self.state.write().await;
            state.current_balance += position.unrealized_pnl;
            Self::record_pnl(&mut state, position.unrealized_pnl);
            state.positions.remove(token);
        }

        breached.len()
    }

    /// Reserves an active-trade slot before a strategy starts executing
    pub async fn begin_trade(&self) {
        self.state.write().await.active_trades += 1;
    }

    /// Releases the slot and settles the trade into the balance
    pub async fn complete_trade(&self, profit: f64, volume: f64) {
        let mut state = self.state.write().await;
        state.active_trades = state.active_trades.saturating_sub(1);
        state.current_balance += profit;
        state.daily_volume += volume;
        Self::record_pnl(&mut state, profit);
    }

    pub async fn activate_emergency_stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("🚨 EMERGENCY STOP activated: {}", reason);
        self.state.write().await.emergency_stop = Some(reason);
    }

    pub async fn deactivate_emergency_stop(&self) {
        info!("✅ Emergency stop deactivated");
        self.state.write().await.emergency_stop = None;
    }

    pub async fn emergency_stop_active(&self) -> bool {
        self.state.read().await.emergency_stop.is_some()
    }

    pub async fn position(&self, token: &str) -> Option<PositionInfo> {
        self.state.read().await.positions.get(token).cloned()
    }

    fn apply_daily_reset(state: &mut RiskState, today: NaiveDate) {
        if today != state.last_reset_date {
            info!(
                "📅 New trading day {}: daily baseline reset to {:.2}",
                today, state.current_balance
            );
            state.daily_start_balance = state.current_balance;
            state.last_reset_date = today;
            state.daily_volume = 0.0;
        }
    }

    fn record_pnl(state: &mut RiskState, pnl: f64) {
        state.recent_pnls.push_back(pnl);
        while state.recent_pnls.len() > PNL_WINDOW {
            state.recent_pnls.pop_front();
        }
    }

    fn total_exposure(state: &RiskState) -> f64 {
        state.positions.values().map(|p| p.notional()).sum()
    }

    /// Peak is the higher of the daily baseline and the current balance,
    /// so drawdown is zero while the balance sits at or above the baseline
    fn drawdown_pct(state: &RiskState) -> f64 {
        let peak = state.daily_start_balance.max(state.current_balance);
        if peak > 0.0 {
            (peak - state.current_balance) / peak * 100.0
        } else {
            0.0
        }
    }

    /// Four capped components: exposure (30), drawdown (25), daily volume
    /// (20), and P&L volatility against 5% of the daily baseline (25).
    fn risk_score(state: &RiskState, limits: &RiskLimits) -> f64 {
        let samples: Vec<f64> = state.recent_pnls.iter().copied().collect();
        let volatility_scale = state.daily_start_balance * 0.05;

        let score = Self::capped(Self::total_exposure(state), limits.max_portfolio_exposure, 30.0)
            + Self::capped(Self::drawdown_pct(state), limits.max_drawdown_pct, 25.0)
            + Self::capped(state.daily_volume, limits.daily_volume_limit, 20.0)
            + Self::capped(math::stddev(&samples), volatility_scale, 25.0);

        score.min(100.0)
    }

    fn capped(value: f64, limit: f64, weight: f64) -> f64 {
        if limit <= 0.0 {
            weight
        } else {
            (value / limit * weight).min(weight)
        }
    }
}
